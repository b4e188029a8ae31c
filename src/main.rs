use anyhow::Context;
use goup::cli::App;
use goup::HttpClient;
use log::LevelFilter;

fn main() {
    stderrlog::new()
        .module(module_path!())
        .verbosity(LevelFilter::Info)
        .init()
        .expect("Failed to initialize logger");

    let r = (|| -> anyhow::Result<()> {
        let config = goup::config::load()?;
        ctrlc::set_handler(move || {
            goup::set_cancelled();
        })
        .context("Error setting Ctrl-C handler")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        let http_client = HttpClient::new(config.http_timeout());
        runtime
            .block_on(goup::CancellableFuture::new(App::new().run(&http_client)))
            .unwrap_or(Ok(()))
    })();

    if let Err(e) = r {
        log::error!("{e}");
        std::process::exit(1);
    }
}
