use anyhow::{bail, Result};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    let client = cloudbit::Client::from_env()?;
    let mut rl = rustyline::Editor::<()>::new()?;
    loop {
        let command = rl.readline(">> ")?;
        if command.is_empty() {
            break;
        };
        let parts = command.split(' ').collect::<Vec<_>>();
        match parts.as_slice() {
            ["read"] => println!("{}", client.read_setting().await),
            ["status"] => println!("{}", client.read_status().await),
            ["write", percent, duration_ms] => println!(
                "{}",
                client
                    .send_setting(percent.parse()?, duration_ms.parse()?)
                    .await
            ),
            _ => bail!("usage: read | status | write <percent> <duration-ms>"),
        }
    }

    Ok(())
}
