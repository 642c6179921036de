use torcheck::{Client, FetchError};

const TARGET_URL: &str = "https://check.torproject.org";

#[tokio::main]
async fn main() -> Result<(), FetchError> {
    env_logger::init();

    let client = Client::new();
    let response = client.get(TARGET_URL).await?;
    println!("{}", response.text());

    Ok(())
}
