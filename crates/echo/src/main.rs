//! Line echo server on top of the nexus session runtime.
//!
//! Every TCP connection becomes one session keyed by its peer address.
//! Frames are echoed back verbatim, `all <text>` broadcasts to every
//! session, and `close` ends the caller's session.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use nexus::transport::TcpByteSource;
use nexus::{BoxError, DEFAULT_READ_BUFFER_SIZE, Nexus, SessionContext, SessionHandler};
use nexus_worker::ActorRuntime;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Echo server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "nexus-echo")]
#[command(about = "Echo server demonstrating supervised connection sessions")]
struct Args {
	/// Address to listen on
	#[arg(short, long, env = "NEXUS_LISTEN", default_value = "127.0.0.1:7878")]
	listen: SocketAddr,

	/// Per-read buffer size in bytes
	#[arg(long, value_name = "BYTES", default_value_t = DEFAULT_READ_BUFFER_SIZE)]
	read_buffer: usize,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

struct EchoHandler;

#[async_trait]
impl SessionHandler for EchoHandler {
	async fn on_connect(&mut self, ctx: &SessionContext) {
		info!(session_id = ctx.identity(), address = %ctx.address(), "client connected");
		let greeting = format!("connected as {}\ncommands: all <text>, close\n", ctx.identity());
		if let Err(err) = ctx.send(greeting.as_bytes()) {
			tracing::warn!(error = %err, "greeting failed");
		}
	}

	async fn on_message(&mut self, ctx: &SessionContext, payload: &[u8]) {
		let line = String::from_utf8_lossy(payload);
		let command = line.trim_end();
		if command == "close" {
			ctx.close();
		} else if let Some(text) = command.strip_prefix("all ") {
			let message = format!("{}: {text}\n", ctx.identity());
			ctx.sessions().broadcast(message.as_bytes(), None);
		} else if let Err(err) = ctx.send(payload) {
			tracing::warn!(error = %err, "echo failed");
		}
	}

	async fn on_disconnect(&mut self, ctx: &SessionContext) {
		info!(session_id = ctx.identity(), "client disconnected");
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	info!("starting nexus-echo");

	let runtime = ActorRuntime::new();
	let builder = Nexus::builder(|_: &str| -> Result<Box<dyn SessionHandler>, BoxError> { Ok(Box::new(EchoHandler)) })
		.read_buffer_size(args.read_buffer);
	info!(options = ?builder.options(), "configuring sessions");
	let nexus = builder.start(&runtime).await?;
	info!(supervisor = %nexus.supervisor_address(), "session supervisor started");

	let listener = TcpListener::bind(args.listen).await?;
	info!(addr = %listener.local_addr()?, "listening");

	let shutdown = CancellationToken::new();
	{
		let shutdown = shutdown.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				shutdown.cancel();
			}
		});
	}

	serve(&listener, &nexus, shutdown).await;

	info!(sessions = nexus.session_count(), "shutting down");
	nexus.shutdown().await;
	runtime.shutdown();
	Ok(())
}

async fn serve(listener: &TcpListener, nexus: &Nexus, shutdown: CancellationToken) {
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => break,
			res = listener.accept() => {
				match res {
					Ok((stream, peer)) => adopt(nexus, stream, peer).await,
					Err(e) => {
						tracing::error!(error = %e, "Failed to accept connection");
					}
				}
			}
		}
	}
}

async fn adopt(nexus: &Nexus, stream: TcpStream, peer: SocketAddr) {
	// Sessions read on dedicated threads, so the socket goes back to blocking mode.
	let stream = match stream.into_std().and_then(|s| s.set_nonblocking(false).map(|()| s)) {
		Ok(stream) => stream,
		Err(e) => {
			tracing::warn!(%peer, error = %e, "Failed to detach connection");
			return;
		}
	};
	let source = TcpByteSource::with_identity(stream, peer.to_string());
	if let Err(e) = nexus.takeover(Arc::new(source)).await {
		tracing::error!(%peer, error = %e, "Failed to hand over connection");
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	// NEXUS_LOG_DIR redirects logs to a per-process file.
	if let Some(log_dir) = std::env::var("NEXUS_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let pid = std::process::id();
		let log_path = log_dir.join(format!("nexus-echo.{pid}.log"));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
				if verbose {
					EnvFilter::new("nexus=trace,nexus_worker=trace,nexus_echo=trace,debug")
				} else {
					EnvFilter::new("nexus=debug,nexus_echo=debug,info")
				}
			});

			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter).with(file_layer).init();

			tracing::info!(path = ?log_path, "Echo tracing initialized");
			return;
		}
	}

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("nexus=debug,nexus_echo=debug,info")
		} else {
			EnvFilter::new("info")
		}
	});
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
