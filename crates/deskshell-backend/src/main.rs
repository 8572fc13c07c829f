use deskshell_backend::{serve, BackendState, Store};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = deskshell_util::init_logging(&deskshell_util::log_dir())?;

    let addr = deskshell_util::backend_addr();
    let store = Store::open(deskshell_util::state_file_path(
        deskshell_backend::store::STATE_FILE_NAME,
    ));
    if let Some(path) = store.path() {
        info!("state file: {}", path.display());
    }
    let state = BackendState::new(store)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("deskshell-backend listening on {}", addr);

    tokio::select! {
        result = serve(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
