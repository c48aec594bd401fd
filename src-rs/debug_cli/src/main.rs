mod cli;
mod client;
mod models;
mod repl;
mod render;

use client::GenClient;
use repl::REPL;

#[tokio::main]
async fn main() {
    imagegen_rs::helpers::init_tracing();
    let config = cli::parse_config();
    let client = match GenClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            render::error(&err);
            std::process::exit(1);
        }
    };
    let mut repl = REPL::new(config, client);
    repl.run().await;
}
