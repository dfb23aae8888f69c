use std::path::PathBuf;

use axum::body::Bytes;
use clap::Parser;

use tls_rest::{ClientError, MediaType, RestClient, RestMethod, RestProtocol, TlsMaterial};

#[derive(Parser)]
#[command(name = "rest-cli")]
#[command(about = "Send one request to a TLS REST server", long_about = None)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(short, long, default_value_t = 8443)]
    port: u16,

    /// http or https
    #[arg(long, default_value = "https")]
    protocol: RestProtocol,

    /// GET, POST, POST_FORM or HEAD
    #[arg(short, long, default_value = "GET")]
    method: RestMethod,

    #[arg(long, default_value = "/")]
    path: String,

    /// Media type sent as Accept
    #[arg(short, long)]
    accept: Option<String>,

    /// POST body
    #[arg(short, long)]
    data: Option<String>,

    /// POST_FORM field as key=value, repeatable
    #[arg(short, long = "form", value_parser = parse_field)]
    form: Vec<(String, String)>,

    /// CA certificate (PEM) to trust instead of the web PKI roots
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Client certificate (PEM)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Accept any server certificate
    #[arg(long)]
    insecure: bool,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut material = TlsMaterial::new().insecure(cli.insecure);
    if let Some(ca) = cli.ca {
        material = material.with_ca(ca);
    }
    if let (Some(cert), Some(key)) = (cli.cert, cli.key) {
        material = material.with_certificate(cert, key);
    }

    let mut client = RestClient::new(cli.host, cli.port)
        .with_tls(material)
        .with_handshake_probe(cli.protocol == RestProtocol::Https);
    client.open().await?;

    let accept = cli.accept.as_deref().map(MediaType::from);
    let result = client
        .request(
            cli.protocol,
            &cli.path,
            cli.method,
            accept.as_ref(),
            cli.data.map(Bytes::from),
            Some(cli.form.as_slice()),
        )
        .await;
    client.close();

    match result {
        Ok(response) => {
            println!("Status: {}", response.status);
            println!("{}", response.text());
            Ok(())
        }
        Err(ClientError::Status { code, status_line, body }) => {
            println!("Status: {code} {status_line}");
            println!("{}", String::from_utf8_lossy(&body));
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}
