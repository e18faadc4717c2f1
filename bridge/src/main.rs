mod host;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
