use crate::descriptor::ServerDescriptor;
use crate::descriptor::ServiceDescriptor;
use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use thiserror::Error;

/// Encodes a descriptor as an XML fragment without a declaration.
///
/// The output is deterministic: attribute order is fixed and services and
/// parameters are written in the order of their maps, so an unchanged
/// descriptor always encodes to the same bytes.
pub fn encode(server: &ServerDescriptor) -> Vec<u8> {
    let mut xml = String::from("<Server");
    push_attribute(&mut xml, "id", &server.id.to_string());
    if let Some(name) = &server.name {
        push_attribute(&mut xml, "name", name);
    }
    if let Some(description) = &server.description {
        push_attribute(&mut xml, "description", description);
    }

    let mut children = String::new();
    for service in server.services.values() {
        children.push_str("<Service");
        push_attribute(&mut children, "name", &service.name);
        push_attribute(&mut children, "port", &service.port.to_string());
        if service.parameters.is_empty() {
            children.push_str("/>");
        } else {
            children.push('>');
            for (key, value) in &service.parameters {
                push_element(&mut children, key, value);
            }
            children.push_str("</Service>");
        }
    }
    for (key, value) in &server.parameters {
        push_element(&mut children, key, value);
    }

    if children.is_empty() {
        xml.push_str("/>");
    } else {
        xml.push('>');
        xml.push_str(&children);
        xml.push_str("</Server>");
    }
    xml.into_bytes()
}

/// Decodes a descriptor from the XML fragment produced by [`encode`].
///
/// Unknown elements are skipped at any nesting depth; their direct text
/// content is harvested as `(element name, text)` parameter pairs, which is
/// also how the regular parameter elements are read.
pub fn decode(data: &[u8]) -> Result<ServerDescriptor, DecodeError> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Server" => {
                let server = server_from_attributes(&e)?;
                return read_server_children(&mut reader, server);
            }
            Event::Empty(e) if e.name().as_ref() == b"Server" => {
                return server_from_attributes(&e);
            }
            Event::Eof => return Err(DecodeError::MissingServerElement),
            _ => {}
        }
        buf.clear();
    }
}

fn push_attribute(xml: &mut String, name: &str, value: &str) {
    xml.push(' ');
    xml.push_str(name);
    xml.push_str("=\"");
    xml.push_str(&escape(&sanitize(value)));
    xml.push('"');
}

fn push_element(xml: &mut String, key: &str, value: &str) {
    let name = element_name(key);
    xml.push('<');
    xml.push_str(&name);
    xml.push('>');
    xml.push_str(&escape(&sanitize(value)));
    xml.push_str("</");
    xml.push_str(&name);
    xml.push('>');
}

/// Parameter keys become element names, which admit far fewer characters
/// than attribute values do.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

/// Replaces control characters with `?` and collapses every whitespace run
/// into a single separator, so the payload stays a valid single-line-ish
/// fragment no matter what the caller put into the descriptor.
fn sanitize(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_whitespace = false;
    let mut saw_line_break = false;
    for c in input.chars() {
        match c {
            ' ' | '\t' => in_whitespace = true,
            '\r' | '\n' => {
                in_whitespace = true;
                saw_line_break = true;
            }
            _ => {
                if in_whitespace && !output.is_empty() {
                    output.push(if saw_line_break { '\n' } else { ' ' });
                }
                in_whitespace = false;
                saw_line_break = false;
                output.push(if (c as u32) < 0x20 { '?' } else { c });
            }
        }
    }
    output
}

fn server_from_attributes(element: &BytesStart) -> Result<ServerDescriptor, DecodeError> {
    let mut id = None;
    let mut name = None;
    let mut description = None;
    for attribute in element.attributes() {
        let attribute = attribute?;
        let value = attribute.unescape_value()?;
        match attribute.key.as_ref() {
            b"id" => {
                id = Some(
                    value
                        .parse()
                        .map_err(|_| DecodeError::InvalidId(value.clone().into_owned()))?,
                )
            }
            b"name" => name = Some(value.into_owned()),
            b"description" => description = Some(value.into_owned()),
            _ => {}
        }
    }
    let mut server = ServerDescriptor::with_id(id.ok_or(DecodeError::MissingId)?);
    server.name = name;
    server.description = description;
    Ok(server)
}

fn service_from_attributes(element: &BytesStart) -> Result<ServiceDescriptor, DecodeError> {
    let mut name = None;
    let mut port = None;
    for attribute in element.attributes() {
        let attribute = attribute?;
        let value = attribute.unescape_value()?;
        match attribute.key.as_ref() {
            b"name" => name = Some(value.into_owned()),
            b"port" => {
                port = Some(
                    value
                        .parse()
                        .map_err(|_| DecodeError::InvalidServicePort(value.clone().into_owned()))?,
                )
            }
            _ => {}
        }
    }
    Ok(ServiceDescriptor::new(
        name.ok_or(DecodeError::MissingServiceName)?,
        port.ok_or(DecodeError::MissingServicePort)?,
    ))
}

fn read_server_children(
    reader: &mut Reader<&[u8]>,
    mut server: ServerDescriptor,
) -> Result<ServerDescriptor, DecodeError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.name().as_ref() == b"Service" {
                    let service = service_from_attributes(&e)?;
                    let service = read_service_children(reader, service)?;
                    server.services.insert(service.name.clone(), service);
                } else {
                    let key = element_name_string(&e)?;
                    read_unknown_subtree(reader, key, &mut server.parameters)?;
                }
            }
            Event::Empty(e) => {
                if e.name().as_ref() == b"Service" {
                    let service = service_from_attributes(&e)?;
                    server.services.insert(service.name.clone(), service);
                }
            }
            Event::End(_) => return Ok(server),
            Event::Eof => return Err(DecodeError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

fn read_service_children(
    reader: &mut Reader<&[u8]>,
    mut service: ServiceDescriptor,
) -> Result<ServiceDescriptor, DecodeError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let key = element_name_string(&e)?;
                read_unknown_subtree(reader, key, &mut service.parameters)?;
            }
            Event::Empty(_) => {}
            Event::End(_) => return Ok(service),
            Event::Eof => return Err(DecodeError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

/// Consumes one unknown subtree, harvesting the text directly inside each
/// element under that element's name. A depth counter pairs every open tag
/// with its close so arbitrarily nested unknown content cannot desynchronize
/// the outer loops.
fn read_unknown_subtree(
    reader: &mut Reader<&[u8]>,
    initial_key: String,
    parameters: &mut BTreeMap<String, String>,
) -> Result<(), DecodeError> {
    let mut key = initial_key;
    let mut depth = 1_usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                key = element_name_string(&e)?;
                depth += 1;
            }
            Event::Empty(_) => {}
            Event::Text(t) => {
                parameters.insert(key.clone(), t.unescape()?.into_owned());
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Err(DecodeError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

fn element_name_string(element: &BytesStart) -> Result<String, DecodeError> {
    String::from_utf8(element.name().as_ref().to_vec())
        .map_err(|_| DecodeError::InvalidElementName)
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Error in XML syntax")]
    Xml(#[from] quick_xml::Error),

    #[error("Error in an XML attribute")]
    Attribute(#[from] AttrError),

    #[error("No `Server` element found")]
    MissingServerElement,

    #[error("`Server` element lacks an `id` attribute")]
    MissingId,

    #[error("`id` is not a 64-bit integer: {0}")]
    InvalidId(String),

    #[error("`Service` element lacks a `name` attribute")]
    MissingServiceName,

    #[error("`Service` element lacks a `port` attribute")]
    MissingServicePort,

    #[error("`port` is not a 16-bit integer: {0}")]
    InvalidServicePort(String),

    #[error("Element name is not UTF-8")]
    InvalidElementName,

    #[error("XML ended before the `Server` element was closed")]
    UnexpectedEof,
}
