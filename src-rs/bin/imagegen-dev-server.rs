use imagegen_rs::api::DevServer;
use imagegen_rs::helpers::{init_tracing, load_dev_service_config};

#[tokio::main]
async fn main() {
    init_tracing();
    let config = load_dev_service_config();

    let server = match DevServer::bind(config) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("bind error: {}", err);
            std::process::exit(1);
        }
    };
    tracing::info!(base_url = %server.base_url(), "imagegen dev server listening");
    if let Err(err) = server.serve().await {
        eprintln!("server error: {}", err);
        std::process::exit(1);
    }
}
