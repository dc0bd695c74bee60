//! Common test utilities and shared imports

// Not every test file uses every helper
#[allow(unused_imports)]
pub use sensorlink_lib::sim::{SimFaults, SimulatedSensor};
#[allow(unused_imports)]
pub use sensorlink_lib::{ClientConfig, Command, SensorClient, SensorError};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// A realistic reading as the sensor sketch produces it (71 bytes, 3 blocks)
#[allow(dead_code)]
pub const SAMPLE_JSON: &str = r#"{"temperature":23.40,"humidity":41.20,"pressure":1013.25,"sample":1234}"#;

// Frames as they appear on the wire
#[allow(dead_code)]
pub const GET_LOCK: [u8; 2] = [6, 0];
#[allow(dead_code)]
pub const LOCK: [u8; 2] = [1, 1];
#[allow(dead_code)]
pub const UNLOCK: [u8; 2] = [1, 0];
#[allow(dead_code)]
pub const BLOCK_SIZE: [u8; 2] = [2, 0];
#[allow(dead_code)]
pub const BLOCK_COUNT: [u8; 2] = [3, 0];
#[allow(dead_code)]
pub const STRING_LENGTH: [u8; 2] = [4, 0];

#[allow(dead_code)]
pub fn get_block(index: u8) -> [u8; 2] {
    [5, index]
}

/// The full frame sequence of one successful fetch of `blocks` blocks
#[allow(dead_code)]
pub fn fetch_sequence(blocks: u8) -> Vec<[u8; 2]> {
    let mut frames = vec![GET_LOCK, LOCK, BLOCK_SIZE, BLOCK_COUNT, STRING_LENGTH];
    frames.extend((1..=blocks).map(get_block));
    frames.extend([UNLOCK, GET_LOCK]);
    frames
}

/// GetBlock indices in the order they were requested
#[allow(dead_code)]
pub fn block_indices(frames: &[[u8; 2]]) -> Vec<u8> {
    frames.iter().filter(|f| f[0] == 5).map(|f| f[1]).collect()
}

/// Route library logs to the test output. `RUST_LOG=sensorlink_lib=trace` shows every frame.
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory log sink for asserting on what the library logs
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Client wired to `sensor`, already initialized
#[allow(dead_code)]
pub async fn connected_client(sensor: &SimulatedSensor) -> SensorClient {
    init_test_logging();
    let client = SensorClient::with_backend(ClientConfig::default(), sensor.clone());
    client.initialize().await.expect("Failed to initialize client");
    client
}
