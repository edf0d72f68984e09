mod app;
mod audio;
mod config;
mod error;
mod library;
mod notify;
mod runtime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime::run().await
}
