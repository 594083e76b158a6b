use clap::Parser;
use clap::Subcommand;
use farol::Announcer;
use farol::Finder;
use farol::ServerDescriptor;
use farol::ServiceDescriptor;
use futures_util::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Announce {
            port,
            name,
            description,
            services,
            parameters,
        } => announce(port, name, description, services, parameters).await?,
        Command::Discover { port } => discover(port).await?,
    };
    Ok(())
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Broadcast this machine's presence until interrupted.
    Announce {
        /// Discovery port shared with the finders.
        port: u16,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Hosted service as `name:port`. Repeatable.
        #[arg(long = "service", value_parser = parse_service)]
        services: Vec<ServiceSpec>,

        /// Extra metadata as `key=value`. Repeatable.
        #[arg(long = "parameter", value_parser = parse_parameter)]
        parameters: Vec<ParameterSpec>,
    },

    /// Print every discovered server as a JSON line until interrupted.
    Discover {
        /// Discovery port shared with the announcers.
        port: u16,
    },
}

#[derive(Clone)]
struct ServiceSpec {
    name: String,
    port: u16,
}

#[derive(Clone)]
struct ParameterSpec {
    key: String,
    value: String,
}

fn parse_service(input: &str) -> Result<ServiceSpec, String> {
    let (name, port) = input
        .rsplit_once(':')
        .ok_or("Expecting `name:port`".to_string())?;
    let port = port.parse().map_err(|_| format!("Invalid port: {port}"))?;
    Ok(ServiceSpec {
        name: name.to_string(),
        port,
    })
}

fn parse_parameter(input: &str) -> Result<ParameterSpec, String> {
    let (key, value) = input
        .split_once('=')
        .ok_or("Expecting `key=value`".to_string())?;
    Ok(ParameterSpec {
        key: key.to_string(),
        value: value.to_string(),
    })
}

async fn announce(
    port: u16,
    name: Option<String>,
    description: Option<String>,
    services: Vec<ServiceSpec>,
    parameters: Vec<ParameterSpec>,
) -> anyhow::Result<()> {
    let mut server = ServerDescriptor::new();
    server.name = name;
    server.description = description;
    for spec in services {
        server.add_service(ServiceDescriptor::new(spec.name, spec.port));
    }
    for spec in parameters {
        server.parameters.insert(spec.key, spec.value);
    }

    let announcer = Announcer::start(&server, port).await?;
    log::info!("Announcing server {} on port {}", server.id, port);
    tokio::signal::ctrl_c().await?;
    announcer.stop();
    Ok(())
}

async fn discover(port: u16) -> anyhow::Result<()> {
    let finder = Finder::new(port)?;
    let mut discoveries = finder.discovered().boxed();
    log::info!("Listening for announcements on port {}", port);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            discovered = discoveries.next() => match discovered {
                Some(discovered) => println!("{}", serde_json::to_string(&discovered)?),
                None => break,
            },
        }
    }
    finder.shutdown();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_service_spec() {
        let spec = parse_service("Checker:87").unwrap();
        assert_eq!(spec.name, "Checker");
        assert_eq!(spec.port, 87);
    }

    #[test]
    fn parse_service_spec_without_port() {
        assert!(parse_service("Checker").is_err());
        assert!(parse_service("Checker:many").is_err());
    }

    #[test]
    fn parse_parameter_spec() {
        let spec = parse_parameter("room=kitchen").unwrap();
        assert_eq!(spec.key, "room");
        assert_eq!(spec.value, "kitchen");
    }
}
