//! IPMI-style request listener
//!
//! Accepts connections on a local Unix stream socket, reads one fixed-size
//! request frame per connection, dispatches it against shared state, and
//! writes back one fixed-size response frame before closing the connection.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use bmc_core::sel::Severity;
use bmc_core::state::FanControlMode;
use bmc_core::GlobalState;
use bmc_protocol::{cmd, completion, netfn, IpmiRequest, IpmiResponse, REQUEST_WIRE_LEN};

const SOCKET_MODE: u32 = 0o600;

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Listen on `socket_path` until `shutdown` is set. Binding failure is
/// reported to the caller but is not fatal to the daemon as a whole; the
/// control loop keeps running even if the listener never comes up.
pub async fn run(state: Arc<Mutex<GlobalState>>, shutdown: &'static AtomicBool, socket_path: &Path) -> std::io::Result<()> {
    if socket_path.exists() {
        let meta = socket_path.symlink_metadata()?;
        if meta.file_type().is_symlink() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "IPMI socket path is a symlink, refusing for security",
            ));
        }
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    info!("IPMI listener bound at {} (mode {:o})", socket_path.display(), SOCKET_MODE);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, state).await {
                                debug!("connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("IPMI listener stopped");
    Ok(())
}

async fn handle_client(mut stream: UnixStream, state: Arc<Mutex<GlobalState>>) -> std::io::Result<()> {
    let mut buf = [0u8; REQUEST_WIRE_LEN];
    stream.read_exact(&mut buf).await?;

    let response = match IpmiRequest::decode(&buf) {
        Ok(request) => dispatch(&request, &state).await,
        Err(e) => {
            warn!("failed to decode request frame: {}", e);
            IpmiResponse::error(completion::INVALID_PARAM)
        }
    };

    stream.write_all(&response.encode()).await?;
    Ok(())
}

/// Dispatch a decoded request against the (NetFn, Cmd) matrix.
async fn dispatch(request: &IpmiRequest, state: &Arc<Mutex<GlobalState>>) -> IpmiResponse {
    match (request.netfn, request.cmd) {
        (netfn::APP, cmd::GET_DEVICE_ID) => handle_get_device_id(),
        (netfn::SENSOR, cmd::GET_SENSOR_READING) => handle_get_sensor_reading(request, state).await,
        (netfn::SENSOR, cmd::SET_FAN_DUTY) => handle_set_fan_duty(request, state).await,
        (netfn::STORAGE, cmd::GET_SEL_ENTRY) => handle_get_sel_entry(request, state).await,
        _ => IpmiResponse::error(completion::INVALID_CMD),
    }
}

fn handle_get_device_id() -> IpmiResponse {
    IpmiResponse::ok(&[0x20, 0x01, 0x02, 0x05, 0x02])
}

async fn handle_get_sensor_reading(request: &IpmiRequest, state: &Arc<Mutex<GlobalState>>) -> IpmiResponse {
    if request.data_len < 1 {
        return IpmiResponse::error(completion::INVALID_PARAM);
    }
    let sensor_num = request.data[0] as usize;

    let guard = state.lock().await;
    let Some(reading) = guard.sensors.get(sensor_num) else {
        return IpmiResponse::error(completion::INVALID_PARAM);
    };

    let raw = (reading.value * 256.0).round() as i16;
    let raw_bytes = bmc_protocol::pack_i16_be(raw);
    let payload = [raw_bytes[0], raw_bytes[1], reading.status.wire_tag(), reading.kind.wire_tag()];
    IpmiResponse::ok(&payload)
}

async fn handle_set_fan_duty(request: &IpmiRequest, state: &Arc<Mutex<GlobalState>>) -> IpmiResponse {
    if request.data_len < 1 {
        return IpmiResponse::error(completion::INVALID_PARAM);
    }
    let duty = request.data[0] as f64;
    if !(0.0..=100.0).contains(&duty) {
        return IpmiResponse::error(completion::INVALID_PARAM);
    }

    let mut guard = state.lock().await;
    guard.set_fan_duty_manual(duty);
    let now = now_unix();
    guard
        .event_log
        .add(Severity::Info, "IPMI", format!("Fan duty manually set to {}%", duty as u8), now);

    IpmiResponse::ok(&[])
}

async fn handle_get_sel_entry(request: &IpmiRequest, state: &Arc<Mutex<GlobalState>>) -> IpmiResponse {
    if request.data_len < 2 {
        return IpmiResponse::error(completion::INVALID_PARAM);
    }
    // The wire frame carries a 16-bit entry id; internally SelEntry::id is a
    // wider counter, but lookups over this protocol are necessarily bounded
    // to the low 16 bits of the id space.
    let entry_id = bmc_protocol::unpack_u16_be([request.data[0], request.data[1]]) as u32;

    let guard = state.lock().await;
    let Some(entry) = guard.event_log.get(entry_id) else {
        return IpmiResponse::error(completion::INVALID_PARAM);
    };

    let id_bytes = bmc_protocol::pack_u16_be(entry.id as u16);
    let mut payload = vec![id_bytes[0], id_bytes[1], entry.severity.wire_tag()];
    let message_bytes = entry.message.as_bytes();
    let max_message_len = message_bytes.len().min(bmc_protocol::SEL_ENTRY_MESSAGE_WIRE_LEN);
    payload.extend_from_slice(&message_bytes[..max_message_len]);

    IpmiResponse::ok(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_core::GlobalState as State;

    #[tokio::test]
    async fn get_device_id_returns_fixed_identity() {
        let resp = handle_get_device_id();
        assert_eq!(resp.completion_code, completion::OK);
        assert_eq!(resp.payload(), &[0x20, 0x01, 0x02, 0x05, 0x02]);
    }

    #[tokio::test]
    async fn get_sensor_reading_rejects_out_of_range_index() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let request = IpmiRequest::new(netfn::SENSOR, cmd::GET_SENSOR_READING, &[99]);
        let resp = handle_get_sensor_reading(&request, &state).await;
        assert_eq!(resp.completion_code, completion::INVALID_PARAM);
    }

    #[tokio::test]
    async fn get_sensor_reading_packs_value_big_endian_8_8_fixed_point() {
        let state = Arc::new(Mutex::new(State::init(0)));
        {
            let mut guard = state.lock().await;
            guard.sensors[0].value = 55.0;
        }

        let request = IpmiRequest::new(netfn::SENSOR, cmd::GET_SENSOR_READING, &[0]);
        let resp = handle_get_sensor_reading(&request, &state).await;

        assert_eq!(resp.completion_code, completion::OK);
        assert_eq!(resp.payload(), &[0x37, 0x00, 0, 0]);
    }

    #[tokio::test]
    async fn get_sel_entry_returns_not_found_for_unknown_id() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let request = IpmiRequest::new(netfn::STORAGE, cmd::GET_SEL_ENTRY, &[0x00, 0x2A]);
        let resp = handle_get_sel_entry(&request, &state).await;
        assert_eq!(resp.completion_code, completion::INVALID_PARAM);
    }

    #[tokio::test]
    async fn get_sel_entry_returns_matching_entry_by_id() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let id = {
            let mut guard = state.lock().await;
            guard.event_log.add(Severity::Warning, "Test", "hello", 0)
        };

        let id_bytes = bmc_protocol::pack_u16_be(id as u16);
        let request = IpmiRequest::new(netfn::STORAGE, cmd::GET_SEL_ENTRY, &id_bytes);
        let resp = handle_get_sel_entry(&request, &state).await;

        assert_eq!(resp.completion_code, completion::OK);
        let payload = resp.payload();
        assert_eq!(bmc_protocol::unpack_u16_be([payload[0], payload[1]]), id as u16);
        assert_eq!(payload[2], Severity::Warning.wire_tag());
        assert_eq!(&payload[3..], b"hello");
    }

    #[tokio::test]
    async fn set_fan_duty_switches_to_manual_mode() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let request = IpmiRequest::new(netfn::SENSOR, cmd::SET_FAN_DUTY, &[42]);
        let resp = handle_set_fan_duty(&request, &state).await;
        assert_eq!(resp.completion_code, completion::OK);

        let guard = state.lock().await;
        assert_eq!(guard.fan_control_mode, FanControlMode::Manual);
        assert_eq!(guard.fan_duty_percent, 42.0);
    }

    #[tokio::test]
    async fn set_fan_duty_rejects_out_of_range_value() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let request = IpmiRequest::new(netfn::SENSOR, cmd::SET_FAN_DUTY, &[150]);
        let resp = handle_set_fan_duty(&request, &state).await;
        assert_eq!(resp.completion_code, completion::INVALID_PARAM);
    }

    #[tokio::test]
    async fn unknown_command_returns_invalid_cmd() {
        let state = Arc::new(Mutex::new(State::init(0)));
        let request = IpmiRequest::new(0xFF, 0xFF, &[]);
        let resp = dispatch(&request, &state).await;
        assert_eq!(resp.completion_code, completion::INVALID_CMD);
    }
}
