use anyhow::Result;

mod cli;
mod print;

#[tokio::main]
async fn main() -> Result<()> {
    cli::do_cli().await
}
