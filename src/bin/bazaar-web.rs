#[tokio::main]
async fn main() {
    if let Err(e) = bazaar::web::run().await {
        eprintln!("bazaar-web: {e}");
        std::process::exit(1);
    }
}
