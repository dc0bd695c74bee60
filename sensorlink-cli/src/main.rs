use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use sensorlink_lib::sim::SimulatedSensor;
use sensorlink_lib::{BusBackend, BusSpeed, ClientConfig, ReadingPayload, SensorClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Poll a JSON sensor over I2C and print its readings.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Initialize once, then fetch a reading on a fixed cadence
    Poll {
        #[command(flatten)]
        bus: BusArgs,
        /// Seconds between readings
        #[arg(short, long, default_value_t = 5)]
        interval_secs: u64,
        /// Stop after this many readings (runs until Ctrl+C otherwise)
        #[arg(short, long)]
        count: Option<u64>,
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
    /// Fetch a single reading
    Read {
        #[command(flatten)]
        bus: BusArgs,
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
    /// List the bus controllers that would be considered
    List {
        #[command(flatten)]
        bus: BusArgs,
    },
}

#[derive(Args, Debug)]
struct BusArgs {
    /// 7-bit device address, decimal or 0x-prefixed hex
    #[arg(short, long, default_value = "0x26", value_parser = parse_address)]
    address: u8,
    /// Bus speed
    #[arg(long, value_enum, default_value_t = SpeedArg::Fast)]
    speed: SpeedArg,
    /// Directory holding the i2c-N device nodes
    #[arg(long, default_value = "/dev")]
    bus_dir: String,
    /// Talk to a simulated sensor instead of real hardware
    #[arg(long)]
    simulate: bool,
    /// Fixed JSON for the simulated sensor to serve (a changing sample otherwise)
    #[arg(long, value_name = "JSON", requires = "simulate")]
    sim_payload: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SpeedArg {
    Standard,
    Fast,
}

impl From<SpeedArg> for BusSpeed {
    fn from(speed: SpeedArg) -> Self {
        match speed {
            SpeedArg::Standard => BusSpeed::Standard,
            SpeedArg::Fast => BusSpeed::Fast,
        }
    }
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

impl BusArgs {
    fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_address(self.address)
            .with_speed(self.speed.into())
    }

    fn backend(&self) -> Result<Arc<dyn BusBackend>> {
        if self.simulate {
            let sensor = match &self.sim_payload {
                Some(payload) => SimulatedSensor::new(payload.as_str()).context("Invalid --sim-payload")?,
                None => {
                    let sensor = SimulatedSensor::new(sample_json(0))?;
                    spawn_sensor_updates(sensor.clone());
                    sensor
                }
            };
            return Ok(Arc::new(sensor.with_address(self.address)));
        }
        linux_backend(&self.bus_dir)
    }
}

#[cfg(target_os = "linux")]
fn linux_backend(bus_dir: &str) -> Result<Arc<dyn BusBackend>> {
    Ok(Arc::new(sensorlink_lib::LinuxI2cBackend::new(bus_dir)))
}

#[cfg(not(target_os = "linux"))]
fn linux_backend(_bus_dir: &str) -> Result<Arc<dyn BusBackend>> {
    bail!("Real I2C access is only supported on Linux; use --simulate")
}

fn sample_json(sample: u64) -> String {
    let temperature = 21.0 + (sample % 10) as f64 * 0.25;
    let humidity = 40.0 + (sample % 7) as f64 * 0.5;
    format!(
        r#"{{"temperature":{:.2},"humidity":{:.2},"sample":{}}}"#,
        temperature, humidity, sample
    )
}

/// Keep the simulated sensor's reading changing like the real one does.
fn spawn_sensor_updates(sensor: SimulatedSensor) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        let mut sample = 0;
        loop {
            ticker.tick().await;
            sample += 1;
            if let Err(e) = sensor.set_payload(sample_json(sample)) {
                warn!("Simulated sensor rejected update: {}", e);
            }
        }
    });
}

fn render(payload: &ReadingPayload, pretty: bool) -> String {
    if pretty {
        match payload.json() {
            Ok(value) => return serde_json::to_string_pretty(&value).unwrap_or_else(|_| payload.to_string()),
            Err(e) => warn!("Reading is not valid JSON: {}", e),
        }
    }
    payload.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Cmd::List { bus } => list(bus),
        Cmd::Read { bus, pretty } => read_once(bus, pretty).await,
        Cmd::Poll {
            bus,
            interval_secs,
            count,
            pretty,
        } => poll(bus, interval_secs, count, pretty).await,
    }
}

fn list(bus: BusArgs) -> Result<()> {
    let controllers = bus
        .backend()?
        .controllers()
        .context("Failed to enumerate bus controllers")?;
    if controllers.is_empty() {
        println!("No I2C bus controllers found.");
        return Ok(());
    }
    for (index, controller) in controllers.iter().enumerate() {
        let marker = if index == 0 { " (selected)" } else { "" };
        println!("{}{}", controller, marker);
    }
    Ok(())
}

async fn connect(bus: &BusArgs) -> Result<SensorClient> {
    let client = SensorClient::new(bus.config(), bus.backend()?);
    client.initialize().await.context("Failed to initialize the sensor")?;
    Ok(client)
}

async fn read_once(bus: BusArgs, pretty: bool) -> Result<()> {
    let client = connect(&bus).await?;
    let result = client.fetch_reading().await;
    client.close().await;
    let payload = result.context("Failed to read the sensor")?;
    println!("{}", render(&payload, pretty));
    Ok(())
}

async fn poll(bus: BusArgs, interval_secs: u64, count: Option<u64>, pretty: bool) -> Result<()> {
    if interval_secs == 0 {
        bail!("--interval-secs must be at least 1");
    }
    let client = connect(&bus).await?;

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down gracefully.");
            let _ = stop.send(true);
        }
    });

    info!("--- Entering Polling Loop ---");
    let taken = poll_loop(&client, Duration::from_secs(interval_secs), count, pretty, shutdown).await;
    info!(taken, "Finished polling.");

    client.close().await;
    Ok(())
}

/// Fetch on every tick until `count` readings were taken or `shutdown` turns true.
///
/// Shutdown is only checked between fetches, so a started fetch always gets
/// to release the sensor's lock.
async fn poll_loop(
    client: &SensorClient,
    period: Duration,
    count: Option<u64>,
    pretty: bool,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval(period);
    // A fetch takes over a second; never let ticks pile up behind a slow one
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut taken = 0;
    while count.is_none_or(|limit| taken < limit) {
        tokio::select! {
            biased;
            Ok(_) = shutdown.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {}
        }
        match client.fetch_reading().await {
            Ok(payload) => println!("{}", render(&payload, pretty)),
            Err(e) => {
                error!("Reading failed: {}", e);
                println!("{}", e);
            }
        }
        taken += 1;
    }
    taken
}
