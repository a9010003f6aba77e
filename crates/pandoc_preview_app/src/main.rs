//! Live pandoc preview for markdown documents.
//!
//! Opens a markdown file, renders it continuously through pandoc into a
//! browser page, and re-renders whenever the source or one of its table
//! satellites changes on disk. Editing happens in an external editor.
//!
//! # Usage
//!
//! ```bash
//! # Open without a file (use the start screen)
//! pandoc-preview
//!
//! # Open with a specific file
//! pandoc-preview /path/to/file.md
//! ```

mod assets;
mod server;

use anyhow::Context;
use clap::Parser;
use pandoc_preview_core::{
    AppConfig, AppPaths, Compiler, ControllerMsg, PipelineController, PythonTableHelper,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "pandoc-preview", version)]
struct Cli {
    /// Document to open at startup.
    file: Option<PathBuf>,

    /// Port for the preview server; 0 picks a free one.
    #[clap(long, default_value_t = 0)]
    port: u16,

    /// Do not open the browser automatically.
    #[clap(long)]
    no_browser: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = AppPaths::discover();
    match Compiler::locate() {
        Some(pandoc) => tracing::info!(path = %pandoc.display(), "found pandoc"),
        None => tracing::warn!("pandoc not found on PATH; compilation will fail"),
    }

    let compiler = Compiler::new(paths.mathjax_script());
    let helper = PythonTableHelper::new(paths.helper_script());
    let config = AppConfig::load_default();

    let handle = PipelineController::spawn(helper, compiler, config)
        .context("failed to initialise the file watcher")?;

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cli.port))
        .await
        .context("failed to bind the preview server")?;
    let port = listener.local_addr()?.port();
    let url = format!("http://127.0.0.1:{port}");
    tracing::info!(%url, "preview server listening");

    if let Some(file) = cli.file {
        let _ = handle.msg_tx.send(ControllerMsg::Open(file));
    }

    if !cli.no_browser {
        if let Err(e) = webbrowser::open(&url) {
            tracing::warn!(error = %e, %url, "could not open the browser");
        }
    }

    server::serve(listener, handle)
        .await
        .context("preview server failed")?;

    Ok(())
}
