use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    net_curfew::logging::init_logging()?;
    net_curfew::run(std::env::args()).await
}
