use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use uart_term::config::{Config, ConfigLoader, TerminalConfig};
use uart_term::display::{self, DisplayMode, LineEnding};
use uart_term::port::SerialBackend;
use uart_term::{
    logging, ChannelSink, DataBits, Parity, PortConfig, SerialSession, SessionError,
    SessionEvent, StopBits, SystemBackend, STANDARD_BAUD_RATES,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "A small serial (UART) terminal.",
    long_about = "Opens a serial port, prints whatever arrives and sends each line typed on stdin. Settings come from uart-term.toml, UART_TERM_* environment variables and the flags below, in increasing priority."
)]
struct Cli {
    /// Use this config file instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and the standard baud rates.
    List {
        /// Print the port list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Open a port and start an interactive session.
    Open(OpenArgs),
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Port name or alias; falls back to `serial.port` from the config.
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// 5, 6, 7 or 8
    #[arg(long)]
    data_bits: Option<DataBits>,

    /// 1, 1.5 or 2
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// n, e, o, m or s
    #[arg(long)]
    parity: Option<Parity>,

    /// Read timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// none, lf or crlf
    #[arg(long)]
    line_ending: Option<LineEnding>,

    /// Show received data as hex.
    #[arg(long)]
    hex: bool,

    /// Prefix received data with the local time.
    #[arg(long)]
    timestamps: bool,

    /// Don't echo sent lines.
    #[arg(long)]
    no_echo: bool,
}

impl OpenArgs {
    /// Flags override whatever the config says.
    fn apply(&self, config: &mut Config) {
        let serial = &mut config.serial;
        if let Some(baud) = self.baud {
            serial.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            serial.data_bits = bits;
        }
        if let Some(bits) = self.stop_bits {
            serial.stop_bits = bits;
        }
        if let Some(parity) = self.parity {
            serial.parity = parity;
        }
        if let Some(timeout) = self.timeout_ms {
            serial.timeout_ms = timeout;
        }

        let terminal = &mut config.terminal;
        if let Some(ending) = self.line_ending {
            terminal.line_ending = ending;
        }
        if self.hex {
            terminal.display = DisplayMode::Hex;
        }
        if self.timestamps {
            terminal.timestamps = true;
        }
        if self.no_echo {
            terminal.echo_sent = false;
        }
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&loader.config().logging);
    if let Some(path) = &loader.config_path {
        debug!(path = %path.display(), "configuration loaded");
    }

    let mut config = loader.into_config();
    match cli.command {
        Command::List { json } => list_ports(json),
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Open(args) => {
            args.apply(&mut config);
            config.validate()?;
            let port = args
                .port
                .clone()
                .or_else(|| config.serial.port.clone())
                .ok_or("no port given; pass one or set serial.port in the config")?;
            let port_config = config.serial.port_config(&port);
            run_terminal(port_config, config.terminal).await
        }
    }
}

fn list_ports(json: bool) -> CliResult<()> {
    let ports = SystemBackend.available_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in &ports {
        let mut line = port.name.clone();
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            line.push_str(&format!("  [{vid:04x}:{pid:04x}]"));
        }
        if let Some(product) = port.product.as_deref().or(port.manufacturer.as_deref()) {
            line.push_str(&format!("  {product}"));
        }
        println!("{line}");
    }

    let rates: Vec<String> = STANDARD_BAUD_RATES.iter().map(u32::to_string).collect();
    println!("\nStandard baud rates: {}", rates.join(", "));
    Ok(())
}

// --- Interactive session ---
async fn run_terminal(port_config: PortConfig, terminal: TerminalConfig) -> CliResult<()> {
    let mut lines = spawn_line_reader(std::io::stdin())?;
    let (sink, events) = ChannelSink::bounded(terminal.queue_capacity);
    let session = Arc::new(SerialSession::system(Arc::new(sink)));

    let port_name = port_config.port_name.clone();
    let settings = port_config.summary();
    {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.open(port_config)).await??;
    }
    eprintln!("Connected to {port_name} at {settings}. Ctrl-C to quit.");

    // Chunks are printed on a blocking task; a fatal error is forwarded here.
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<SessionError>();
    let mode = terminal.display;
    let timestamps = terminal.timestamps;
    let printer = tokio::task::spawn_blocking(move || {
        print_events(events, std::io::stdout(), &fatal_tx, mode, timestamps);
    });

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome: CliResult<()> = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break Ok(());
            }
            Some(err) = fatal_rx.recv() => {
                break Err(err.into());
            }
            line = lines.recv() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                };
                if let Err(e) = send_line(&session, &line, &terminal).await {
                    break Err(e);
                }
            }
        }
    };

    {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.close()).await?;
    }
    drop(session);
    // Ends once the receive loop has let go of the sink.
    printer.await?;
    eprintln!("Disconnected from {port_name}.");
    outcome
}

/// Write chunks to `out` until the session lets go of the sink. Fatal errors
/// go to `fatal_tx`, even after `out` has failed.
fn print_events<W: Write>(
    events: impl IntoIterator<Item = SessionEvent>,
    mut out: W,
    fatal_tx: &mpsc::UnboundedSender<SessionError>,
    mode: DisplayMode,
    timestamps: bool,
) {
    let mut out_open = true;
    for event in events {
        match event {
            SessionEvent::Chunk(chunk) if out_open => {
                let rendered = display::render_chunk(&chunk, mode, timestamps);
                let written = out.write_all(rendered.as_bytes()).and_then(|()| out.flush());
                if let Err(e) = written {
                    debug!(error = %e, "stdout closed; received data is no longer printed");
                    out_open = false;
                }
            }
            SessionEvent::Chunk(_) => {}
            SessionEvent::Fatal(err) => {
                if let Err(e) = fatal_tx.send(err) {
                    debug!(error = %e.0, "fatal error arrived after the terminal stopped");
                }
            }
        }
    }
}

type LineReceiver = mpsc::UnboundedReceiver<std::io::Result<String>>;

/// Read lines on a plain thread so a blocked read never holds up runtime
/// shutdown. The channel closes at end of input or after the first error.
fn spawn_line_reader<R>(input: R) -> std::io::Result<LineReceiver>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in BufReader::new(input).lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

async fn send_line(
    session: &Arc<SerialSession>,
    line: &str,
    terminal: &TerminalConfig,
) -> CliResult<()> {
    let payload = display::encode_line(line, terminal.line_ending);
    let session = Arc::clone(session);
    let result = tokio::task::spawn_blocking(move || session.send(&payload)).await?;

    match result {
        Ok(()) => {
            if terminal.echo_sent {
                print!("{}", display::render_sent(line));
                std::io::stdout().flush()?;
            }
        }
        Err(SessionError::EmptyPayload) => eprintln!("warning: nothing to send"),
        Err(err) => eprintln!("error: {err}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use uart_term::ReceivedChunk;

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "input gone"))
        }
    }

    /// Accepts `budget` writes, then fails like a closed pipe.
    struct ClosingPipe {
        written: Vec<u8>,
        budget: usize,
        attempts: usize,
    }

    impl Write for ClosingPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.budget -= 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_printer_keeps_forwarding_fatal_after_stdout_fails() {
        let events = vec![
            SessionEvent::Chunk(ReceivedChunk::new(0, b"ok\n".to_vec())),
            SessionEvent::Chunk(ReceivedChunk::new(1, b"lost".to_vec())),
            SessionEvent::Chunk(ReceivedChunk::new(2, b"lost".to_vec())),
            SessionEvent::Fatal(SessionError::NotOpen),
        ];
        let mut pipe = ClosingPipe {
            written: Vec::new(),
            budget: 1,
            attempts: 0,
        };
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

        print_events(events, &mut pipe, &fatal_tx, DisplayMode::Text, false);

        assert_eq!(pipe.written, b"ok\n");
        // The printer stops writing after the first failure.
        assert_eq!(pipe.attempts, 2);
        assert_eq!(fatal_rx.try_recv().unwrap(), SessionError::NotOpen);
    }

    #[test]
    fn test_printer_survives_a_gone_fatal_receiver() {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        drop(fatal_rx);
        let mut out = Vec::new();
        let events = vec![
            SessionEvent::Fatal(SessionError::NotOpen),
            SessionEvent::Chunk(ReceivedChunk::new(0, b"after".to_vec())),
        ];

        print_events(events, &mut out, &fatal_tx, DisplayMode::Text, false);
        assert_eq!(out, b"after");
    }

    #[test]
    fn test_line_reader_ends_at_eof() {
        let mut rx = spawn_line_reader(Cursor::new("AT\r\nATI\n")).unwrap();
        assert_eq!(rx.blocking_recv().unwrap().unwrap(), "AT");
        assert_eq!(rx.blocking_recv().unwrap().unwrap(), "ATI");
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_line_reader_stops_after_error() {
        let mut rx = spawn_line_reader(Broken).unwrap();
        let err = rx.blocking_recv().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(rx.blocking_recv().is_none());
    }

    #[tokio::test]
    async fn test_line_reader_does_not_block_the_runtime() {
        // A reader that never finishes must not hold up the select loop.
        struct Stalled;
        impl Read for Stalled {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                thread::sleep(std::time::Duration::from_secs(3600));
                Ok(0)
            }
        }

        let mut rx = spawn_line_reader(Stalled).unwrap();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
    }
}
