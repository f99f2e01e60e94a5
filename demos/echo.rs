//! Echo server driven by the connection manager.
//!
//! Every request read from a client is sent straight back. Useful for
//! watching the manager's logging:
//!
//! ```text
//! RUST_LOG=connmgr=debug cargo run --example echo -- --listen 127.0.0.1:4000
//! ```

use connmgr::tcp::{TcpConnection, TcpListenerConnection};
use connmgr::{
    Connection, ConnectionManager, ConnectionRef, Handle, Lifecycle, ManagerBuilder, ManagerConfig,
    ManagerToken, Readiness, poll,
};
use getopts::Options;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN: &str = "127.0.0.1:4000";

/// The two kinds of connection the echo server registers.
enum EchoConnection {
    Listener(TcpListenerConnection),
    Stream(TcpConnection),
}

impl EchoConnection {
    fn inner(&self) -> &dyn Connection {
        match self {
            EchoConnection::Listener(c) => c,
            EchoConnection::Stream(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Connection {
        match self {
            EchoConnection::Listener(c) => c,
            EchoConnection::Stream(c) => c,
        }
    }
}

impl Connection for EchoConnection {
    fn handle(&self) -> Handle {
        self.inner().handle()
    }

    fn send(&mut self) -> Readiness {
        self.inner_mut().send()
    }

    fn receive(&mut self) -> Readiness {
        self.inner_mut().receive()
    }

    fn reset(&mut self, forceful: bool) -> Readiness {
        self.inner_mut().reset(forceful)
    }

    fn shutdown(&mut self) {
        self.inner_mut().shutdown()
    }

    fn readiness(&self) -> Readiness {
        self.inner().readiness()
    }

    fn state(&self) -> Lifecycle {
        self.inner().state()
    }

    fn timeout(&self) -> Duration {
        self.inner().timeout()
    }

    fn is_auto_destroyable(&self) -> bool {
        self.inner().is_auto_destroyable()
    }

    fn bind_manager(&mut self, token: Option<ManagerToken>) {
        self.inner_mut().bind_manager(token)
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {program} [options]");
    print!("{}", opts.usage(&brief));
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("l", "listen", "address to listen on", "ADDR");
    opts.optopt("c", "config", "manager configuration file", "FILE");
    opts.optopt("t", "timeout-ms", "idle timeout per connection", "MS");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            print_usage(&program, &opts);
            std::process::exit(1);
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return;
    }

    let listen: SocketAddr = match matches
        .opt_str("listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string())
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid listen address: {e}");
            std::process::exit(1);
        }
    };

    let config = match matches.opt_str("config") {
        Some(path) => match ManagerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => ManagerConfig::default(),
    };

    let timeout = match matches.opt_str("timeout-ms").map(|ms| ms.parse::<u64>()) {
        Some(Ok(ms)) => Duration::from_millis(ms),
        Some(Err(e)) => {
            eprintln!("invalid timeout: {e}");
            std::process::exit(1);
        }
        None => connmgr::tcp::DEFAULT_TIMEOUT,
    };

    if let Err(e) = run(listen, config, timeout) {
        error!("echo server failed: {e}");
        std::process::exit(1);
    }
}

fn run(listen: SocketAddr, config: ManagerConfig, timeout: Duration) -> std::io::Result<()> {
    let mut manager: ConnectionManager<EchoConnection> = ManagerBuilder::new()
        .config(config)
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let listener = TcpListenerConnection::bind(listen)?;
    info!("listening on {}", listener.local_addr()?);

    let listener = Rc::new(RefCell::new(EchoConnection::Listener(listener)));
    manager
        .add_connection(listener)
        .map_err(std::io::Error::other)?;

    loop {
        poll::poll_once(&mut manager, Some(Duration::from_secs(1)))?;

        while let Some(conn) = manager.next_serviceable() {
            let accepted = serve(&conn, timeout);
            for stream in accepted {
                let handle = stream.borrow().handle();
                if let Err(e) = manager.add_connection(stream) {
                    warn!("dropping connection on handle {handle}: {e}");
                }
            }
            manager.reactivate(&conn);
        }
    }
}

/// Handle one serviceable connection. Returns any newly accepted streams.
fn serve(conn: &ConnectionRef<EchoConnection>, timeout: Duration) -> Vec<ConnectionRef<EchoConnection>> {
    let mut accepted = Vec::new();
    match &mut *conn.borrow_mut() {
        EchoConnection::Listener(listener) => {
            while let Some((stream, addr)) = listener.take_accepted() {
                match TcpConnection::new(stream) {
                    Ok(stream) => {
                        info!("client connected from {addr}");
                        let stream = stream.with_timeout(timeout);
                        accepted.push(Rc::new(RefCell::new(EchoConnection::Stream(stream))));
                    }
                    Err(e) => warn!("failed to set up connection from {addr}: {e}"),
                }
            }
        }
        EchoConnection::Stream(stream) => {
            let request = stream.take_received();
            stream.queue_reply(&request);
        }
    }
    accepted
}
