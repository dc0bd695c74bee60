use crate::bus::{BusConnection, BusSpeed};
use crate::command::{Command, Frame};
use crate::config::ClientConfig;
use crate::constants::{BLOCK_LEN, DEFAULT_ADDRESS, MAX_PAYLOAD_LEN};
use crate::error::SensorError;
use crate::payload::{BlockLayout, ReadingPayload, clean_text, decode_block};
use crate::sim::SimulatedSensor;

fn padded(text: &str) -> Vec<u8> {
    let mut block = text.as_bytes().to_vec();
    block.resize(BLOCK_LEN, 0);
    block
}

#[test]
fn test_command_wire_values() {
    let expected = [
        (Command::SetLock, 1u8),
        (Command::BlockSize, 2),
        (Command::BlockCount, 3),
        (Command::StringLength, 4),
        (Command::GetBlock, 5),
        (Command::GetLock, 6),
    ];
    for (command, byte) in expected {
        assert_eq!(u8::from(command), byte, "{} has the wrong wire value", command);
        assert_eq!(Command::try_from(byte).unwrap(), command);
    }
    assert!(Command::try_from(0).is_err());
    assert!(Command::try_from(7).is_err());
}

#[test]
fn test_response_lengths() {
    assert_eq!(Command::GetBlock.response_len(), 32);
    for command in [
        Command::SetLock,
        Command::BlockSize,
        Command::BlockCount,
        Command::StringLength,
        Command::GetLock,
    ] {
        assert_eq!(command.response_len(), 1, "{} should answer with one byte", command);
    }
}

#[test]
fn test_frame_encoding() {
    assert_eq!(Command::SetLock.frame(1).to_bytes(), [0x01, 0x01]);
    assert_eq!(Command::GetBlock.frame(3).to_bytes(), [0x05, 0x03]);
    assert_eq!(
        Frame::parse(&[0x06, 0x00]),
        Some(Frame {
            command: Command::GetLock,
            argument: 0
        })
    );
    assert_eq!(Frame::parse(&[0x09, 0x00]), None);
    assert_eq!(Frame::parse(&[0x01]), None);
    assert_eq!(Frame::parse(&[0x01, 0x00, 0x00]), None);
}

#[test]
fn test_clean_text_replaces_nulls_and_trims() {
    assert_eq!(clean_text("ab\0\0cd\0\0"), "ab  cd");
    assert_eq!(clean_text("\0 {\"a\":1} \0\r\n"), "{\"a\":1}");
    assert_eq!(clean_text("\0\0\0"), "");
}

#[test]
fn test_decode_block_is_lossy() {
    let decoded = decode_block(&[b'o', b'k', 0xFF, 0x00]);
    assert!(decoded.starts_with("ok"));
    assert!(decoded.contains('\u{FFFD}'));
    assert!(decoded.ends_with('\0'));
}

#[test]
fn test_assemble_keeps_raw_concatenation() {
    let layout = BlockLayout {
        block_size: 32,
        block_count: 2,
        string_length: 36,
    };
    let blocks = [padded("ab"), padded("cdef")];
    let payload = ReadingPayload::assemble(layout, &blocks).expect("payload should validate");

    assert_eq!(payload.raw().len(), 64);
    assert_eq!(&payload.raw()[..32], blocks[0].as_slice());
    assert_eq!(&payload.raw()[32..], blocks[1].as_slice());
    // Interior padding turns into spaces; only the edges are trimmed
    assert_eq!(payload.as_str(), format!("ab{}cdef", " ".repeat(30)));
}

#[test]
fn test_assemble_interior_padding_counts_towards_length() {
    let layout = BlockLayout {
        block_size: 32,
        block_count: 2,
        string_length: 6,
    };
    let blocks = [padded("ab"), padded("cdef")];
    match ReadingPayload::assemble(layout, &blocks) {
        Err(SensorError::PayloadLengthMismatch { expected, actual }) => {
            assert_eq!(expected, 6);
            assert_eq!(actual, 36);
        }
        other => panic!("Expected PayloadLengthMismatch, got {:?}", other),
    }
}

#[test]
fn test_assemble_full_first_block() {
    let json = r#"{"temperature":21.5,"humidity":40.25}"#;
    assert_eq!(json.len(), 37);
    let layout = BlockLayout {
        block_size: 32,
        block_count: 2,
        string_length: 37,
    };
    let blocks = [json.as_bytes()[..32].to_vec(), padded(&json[32..])];
    let payload = ReadingPayload::assemble(layout, &blocks).unwrap();

    assert_eq!(payload.as_str(), json);
    assert_eq!(payload.to_string(), json);
    assert_eq!(payload.expected_len(), 37);
    assert_eq!(payload.json().unwrap()["humidity"], 40.25);
}

#[test]
fn test_assemble_rejects_short_payload() {
    let layout = BlockLayout {
        block_size: 32,
        block_count: 1,
        string_length: 5,
    };
    let result = ReadingPayload::assemble(layout, &[padded("abcdef")]);
    assert!(matches!(
        result,
        Err(SensorError::PayloadLengthMismatch { expected: 5, actual: 6 })
    ));
}

#[test]
fn test_assemble_without_blocks() {
    let layout = BlockLayout {
        block_size: 32,
        block_count: 0,
        string_length: 0,
    };
    let payload = ReadingPayload::assemble::<Vec<u8>>(layout, &[]).unwrap();
    assert_eq!(payload.as_str(), "");
    assert!(payload.raw().is_empty());
    assert!(payload.json().is_err());
}

#[test]
fn test_config_defaults() {
    let config = ClientConfig::default();
    assert_eq!(config.address, DEFAULT_ADDRESS);
    assert_eq!(config.address, 0x26);
    assert_eq!(config.speed, BusSpeed::Fast);
    assert_eq!(config.speed.as_hz(), 400_000);
    assert!(config.validate().is_ok());

    let config = config.with_address(0x80).with_speed(BusSpeed::Standard);
    assert_eq!(config.speed.as_hz(), 100_000);
    assert!(matches!(config.validate(), Err(SensorError::InvalidAddress(0x80))));
}

#[test]
fn test_open_uses_first_controller() {
    let sensor = SimulatedSensor::new("{}").unwrap().with_controller("sim-i2c-1");
    let conn = BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast).unwrap();
    assert_eq!(conn.controller().id, "sim-i2c-0");
    assert_eq!(conn.address(), DEFAULT_ADDRESS);
    assert_eq!(conn.speed(), BusSpeed::Fast);
    assert!(conn.is_open());
    assert_eq!(sensor.claims(), 1);
}

#[test]
fn test_open_without_controller() {
    let sensor = SimulatedSensor::new("{}").unwrap().without_controllers();
    let result = BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast);
    assert!(matches!(result, Err(SensorError::NoControllerFound)));
    assert_eq!(sensor.claims(), 0);
}

#[test]
fn test_open_unclaimable_device() {
    let sensor = SimulatedSensor::new("{}").unwrap().unclaimable().with_controller("sim-i2c-1");
    match BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast) {
        Err(SensorError::DeviceUnavailable { controller, .. }) => assert_eq!(controller, "sim-i2c-0"),
        other => panic!("Expected DeviceUnavailable, got {:?}", other),
    }
}

#[test]
fn test_open_rejects_ten_bit_address() {
    let sensor = SimulatedSensor::new("{}").unwrap();
    let result = BusConnection::open(&sensor, 0x90, BusSpeed::Fast);
    assert!(matches!(result, Err(SensorError::InvalidAddress(0x90))));
}

#[test]
fn test_close_is_idempotent() {
    let sensor = SimulatedSensor::new("{}").unwrap();
    let mut conn = BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast).unwrap();

    conn.close();
    conn.close();
    assert!(!conn.is_open());
    assert_eq!(sensor.releases(), 1);

    assert!(matches!(conn.write(&[6, 0]), Err(SensorError::ConnectionClosed)));
    assert!(matches!(conn.read_exact(1), Err(SensorError::ConnectionClosed)));

    drop(conn);
    assert_eq!(sensor.releases(), 1, "drop after close must not release again");
}

#[test]
fn test_drop_releases_handle() {
    let sensor = SimulatedSensor::new("{}").unwrap();
    let conn = BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast).unwrap();
    drop(conn);
    assert_eq!(sensor.releases(), 1);
}

#[test]
fn test_write_to_absent_device_is_bus_error() {
    let sensor = SimulatedSensor::new("{}").unwrap().with_address(0x27);
    let mut conn = BusConnection::open(&sensor, DEFAULT_ADDRESS, BusSpeed::Fast).unwrap();
    assert!(matches!(conn.write(&[6, 0]), Err(SensorError::BusIo(_))));
}

#[test]
fn test_simulated_payload_limited_to_one_byte_length() {
    let longest = "x".repeat(MAX_PAYLOAD_LEN);
    assert!(SimulatedSensor::new(longest.clone()).is_ok());

    match SimulatedSensor::new("x".repeat(MAX_PAYLOAD_LEN + 1)) {
        Err(SensorError::PayloadTooLong { len, max }) => {
            assert_eq!(len, 256);
            assert_eq!(max, 255);
        }
        other => panic!("Expected PayloadTooLong, got {:?}", other),
    }

    let sensor = SimulatedSensor::new("{}").unwrap();
    assert!(matches!(
        sensor.set_payload("y".repeat(300)),
        Err(SensorError::PayloadTooLong { len: 300, .. })
    ));
    assert_eq!(sensor.payload(), "{}", "rejected payload must not replace the current one");
    sensor.set_payload(longest.clone()).unwrap();
    assert_eq!(sensor.payload(), longest);
}
