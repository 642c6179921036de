use torcheck::{Client, FetchError, SocksProxy};

const TARGET_URL: &str = "https://check.torproject.org";

// Tor's default SOCKS listener.
const PROXY_ADDR: &str = "socks5://127.0.0.1:9050";

#[tokio::main]
async fn main() -> Result<(), FetchError> {
    env_logger::init();

    let proxy = SocksProxy::new(PROXY_ADDR).expect("proxy address should parse");
    let client = Client::with_proxy(proxy);
    let response = client.get(TARGET_URL).await?;
    println!("{}", response.text());

    Ok(())
}
