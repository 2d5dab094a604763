use std::time::Duration;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    let client = cloudbit::Client::from_env()?;
    loop {
        println!("{}", client.read_setting().await);
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
