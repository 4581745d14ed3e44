use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;
use tracing::warn;

use crate::router::OutboundEvent;

pub const DEVICE_TO_CONTROLLER_CAP: usize = 65_536;
pub const CONTROLLER_TO_DEVICE_CAP: usize = 1_048_576;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t")]
pub enum DeviceEnvelope {
    #[serde(rename = "ready")]
    Ready { capabilities: Value },
    #[serde(rename = "event")]
    Event {
        service: String,
        is_event: bool,
        data: Vec<(String, String)>,
    },
}

/// Commands from the controller. Documents travel as JSON text and are
/// parsed on the device side under the decoder's arena budget.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "t")]
pub enum ControllerEnvelope {
    #[serde(rename = "set_theme")]
    SetTheme { json_value: String },

    #[serde(rename = "set_pages")]
    SetPages {
        jsons: Vec<String>,
        #[serde(default)]
        page: i64,
    },

    #[serde(rename = "add_page")]
    AddPage {
        json_value: String,
        #[serde(default)]
        reset: bool,
    },

    #[serde(rename = "set_value")]
    SetValue {
        page: i64,
        item: i64,
        json_value: String,
    },

    /// `offset` and `size` count 32-bit words; `size` is the whole transfer.
    #[serde(rename = "set_data")]
    SetData {
        page: i64,
        item: i64,
        data: Vec<i32>,
        offset: usize,
        size: usize,
    },

    #[serde(rename = "show_page")]
    ShowPage { page: i64 },

    #[serde(rename = "set_button")]
    SetButton { index: i64, json_value: String },

    #[serde(rename = "show_more")]
    ShowMore { json_value: String },

    #[serde(rename = "hide_more")]
    HideMore,

    #[serde(rename = "set_data_more")]
    SetDataMore {
        data: Vec<i32>,
        offset: usize,
        size: usize,
    },

    #[serde(rename = "play_song")]
    PlaySong { song: String },
}

pub fn ready_envelope() -> DeviceEnvelope {
    DeviceEnvelope::Ready {
        capabilities: serde_json::json!({
            "transport": "stdio-packet-4",
            "data_word_bytes": 4
        }),
    }
}

pub fn event_envelope(service: &str, event: OutboundEvent) -> DeviceEnvelope {
    DeviceEnvelope::Event {
        service: service.to_string(),
        is_event: true,
        data: event.data,
    }
}

pub fn writer_loop(rx: Receiver<DeviceEnvelope>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    for envelope in rx {
        let payload = encode_device_envelope(&envelope)?;
        if let Err(err) = write_event_frame(&mut writer, &payload) {
            if err.kind() != io::ErrorKind::InvalidData {
                return Err(err);
            }
            warn!(%err, "outbound envelope dropped");
            continue;
        }
        writer.flush()?;
    }

    Ok(())
}

/// Read frames from stdin until EOF. A frame that does not decode to a known
/// command is logged and skipped.
pub fn reader_loop<F>(mut on_envelope: F) -> io::Result<()>
where
    F: FnMut(ControllerEnvelope),
{
    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        match read_command_frame(&mut reader) {
            Ok(payload) => match decode_controller_envelope(&payload) {
                Ok(envelope) => on_envelope(envelope),
                Err(err) => warn!(%err, len = payload.len(), "undecodable command dropped"),
            },
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

fn encode_device_envelope(envelope: &DeviceEnvelope) -> io::Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(json_error)
}

fn decode_controller_envelope(payload: &[u8]) -> io::Result<ControllerEnvelope> {
    serde_json::from_slice(payload).map_err(json_error)
}

/// One command frame from the controller, capped at
/// [`CONTROLLER_TO_DEVICE_CAP`].
fn read_command_frame(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = usize::try_from(u32::from_be_bytes(len_buf)).unwrap_or(usize::MAX);
    if len > CONTROLLER_TO_DEVICE_CAP {
        return Err(oversized(
            "command",
            len,
            "CONTROLLER_TO_DEVICE_CAP",
            CONTROLLER_TO_DEVICE_CAP,
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// One event frame to the controller, capped at [`DEVICE_TO_CONTROLLER_CAP`].
/// Nothing is written for an oversized payload.
fn write_event_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    if payload.len() > DEVICE_TO_CONTROLLER_CAP {
        return Err(oversized(
            "event",
            payload.len(),
            "DEVICE_TO_CONTROLLER_CAP",
            DEVICE_TO_CONTROLLER_CAP,
        ));
    }

    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, "event frame length exceeds u32")
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)
}

fn oversized(kind: &str, len: usize, cap_name: &str, cap: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{kind} frame of {len} bytes exceeds {cap_name} ({cap})"),
    )
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
