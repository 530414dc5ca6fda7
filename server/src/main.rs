#[tokio::main]
async fn main() -> std::io::Result<()> {
    server::run().await
}
