mod api;
mod app;
mod color;
mod config;
mod conversation;
mod emotion;
mod panel;
mod renderer;
mod scheduler;
mod speech;
mod state_machine;
mod tessellate;
mod transcript;
mod visual;
mod waves;

use std::sync::Arc;
use winit::event_loop::EventLoop;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Aura v{}", env!("CARGO_PKG_VERSION"));

    let tokio_rt = Arc::new(
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?,
    );

    // Chat, sentiment and speech results arrive as user events
    let event_loop = EventLoop::<conversation::Event>::with_user_event().build()?;
    let proxy = event_loop.create_proxy();

    let mut app = app::App::new(tokio_rt, proxy);

    log::info!("Starting event loop");
    event_loop.run_app(&mut app)?;

    match app.take_fatal() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
