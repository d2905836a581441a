//! IPMI-style binary wire protocol
//!
//! Requests and responses are fixed-shape records framed over a local stream
//! socket (see `bmc-daemon`'s listener). Every multi-byte value carried in a
//! frame's data payload — the 8.8 fixed-point sensor reading, the 16-bit SEL
//! entry id — is packed big-endian, matching IPMI convention. The frame
//! header fields (netfn, cmd, data_len) are single bytes and have no
//! endianness of their own.

use bmc_error::{BmcError, Result};

/// Capacity of the fixed `data` field carried by both request and response frames.
pub const MAX_DATA_LEN: usize = 256;

/// Wire size of a request frame: netfn + cmd + data + data_len.
pub const REQUEST_WIRE_LEN: usize = 1 + 1 + MAX_DATA_LEN + 1;

/// Wire size of a response frame: completion_code + data + data_len.
pub const RESPONSE_WIRE_LEN: usize = 1 + MAX_DATA_LEN + 1;

/// Maximum message length carried in a `Get SEL Entry` response payload
/// (bytes 3.. of the response data), independent of `MAX_DATA_LEN`.
pub const SEL_ENTRY_MESSAGE_WIRE_LEN: usize = 200;

/// IPMI Network Function codes used by the dispatch matrix.
pub mod netfn {
    pub const APP: u8 = 0x06;
    pub const SENSOR: u8 = 0x04;
    pub const STORAGE: u8 = 0x0A;
}

/// Command codes used by the dispatch matrix.
pub mod cmd {
    pub const GET_DEVICE_ID: u8 = 0x01;
    pub const GET_SENSOR_READING: u8 = 0x2D;
    pub const SET_FAN_DUTY: u8 = 0x30;
    pub const GET_SEL_ENTRY: u8 = 0x43;
}

/// Completion codes returned in `IpmiResponse::completion_code`.
pub mod completion {
    pub const OK: u8 = 0x00;
    pub const INVALID_CMD: u8 = 0xC1;
    pub const INVALID_PARAM: u8 = 0xC9;
    pub const UNSPECIFIED: u8 = 0xFF;
}

/// A fixed-shape IPMI-style request frame.
#[derive(Debug, Clone)]
pub struct IpmiRequest {
    pub netfn: u8,
    pub cmd: u8,
    pub data: [u8; MAX_DATA_LEN],
    pub data_len: u8,
}

impl IpmiRequest {
    /// Build a request, truncating `payload` to `MAX_DATA_LEN` if needed.
    pub fn new(netfn: u8, cmd: u8, payload: &[u8]) -> Self {
        let mut data = [0u8; MAX_DATA_LEN];
        let n = payload.len().min(MAX_DATA_LEN);
        data[..n].copy_from_slice(&payload[..n]);
        Self {
            netfn,
            cmd,
            data,
            data_len: n as u8,
        }
    }

    /// The valid prefix of `data`, per `data_len`.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_len as usize]
    }

    pub fn encode(&self) -> [u8; REQUEST_WIRE_LEN] {
        let mut buf = [0u8; REQUEST_WIRE_LEN];
        buf[0] = self.netfn;
        buf[1] = self.cmd;
        buf[2..2 + MAX_DATA_LEN].copy_from_slice(&self.data);
        buf[2 + MAX_DATA_LEN] = self.data_len;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != REQUEST_WIRE_LEN {
            return Err(BmcError::ipmi_protocol(format!(
                "request frame is {} bytes, expected {}",
                buf.len(),
                REQUEST_WIRE_LEN
            )));
        }
        let netfn = buf[0];
        let cmd = buf[1];
        let mut data = [0u8; MAX_DATA_LEN];
        data.copy_from_slice(&buf[2..2 + MAX_DATA_LEN]);
        let data_len = buf[2 + MAX_DATA_LEN];
        if data_len as usize > MAX_DATA_LEN {
            return Err(BmcError::ipmi_protocol(format!(
                "data_len {} exceeds {}",
                data_len, MAX_DATA_LEN
            )));
        }
        Ok(Self {
            netfn,
            cmd,
            data,
            data_len,
        })
    }
}

/// A fixed-shape IPMI-style response frame.
#[derive(Debug, Clone)]
pub struct IpmiResponse {
    pub completion_code: u8,
    pub data: [u8; MAX_DATA_LEN],
    pub data_len: u8,
}

impl IpmiResponse {
    /// Build a success response carrying `payload`.
    pub fn ok(payload: &[u8]) -> Self {
        Self::with_code(completion::OK, payload)
    }

    /// Build an empty response carrying just a completion code.
    pub fn error(code: u8) -> Self {
        Self::with_code(code, &[])
    }

    pub fn with_code(code: u8, payload: &[u8]) -> Self {
        let mut data = [0u8; MAX_DATA_LEN];
        let n = payload.len().min(MAX_DATA_LEN);
        data[..n].copy_from_slice(&payload[..n]);
        Self {
            completion_code: code,
            data,
            data_len: n as u8,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_len as usize]
    }

    pub fn encode(&self) -> [u8; RESPONSE_WIRE_LEN] {
        let mut buf = [0u8; RESPONSE_WIRE_LEN];
        buf[0] = self.completion_code;
        buf[1..1 + MAX_DATA_LEN].copy_from_slice(&self.data);
        buf[1 + MAX_DATA_LEN] = self.data_len;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != RESPONSE_WIRE_LEN {
            return Err(BmcError::ipmi_protocol(format!(
                "response frame is {} bytes, expected {}",
                buf.len(),
                RESPONSE_WIRE_LEN
            )));
        }
        let completion_code = buf[0];
        let mut data = [0u8; MAX_DATA_LEN];
        data.copy_from_slice(&buf[1..1 + MAX_DATA_LEN]);
        let data_len = buf[1 + MAX_DATA_LEN];
        if data_len as usize > MAX_DATA_LEN {
            return Err(BmcError::ipmi_protocol(format!(
                "data_len {} exceeds {}",
                data_len, MAX_DATA_LEN
            )));
        }
        Ok(Self {
            completion_code,
            data,
            data_len,
        })
    }
}

/// Pack a signed 16-bit value big-endian (IPMI convention).
#[inline]
pub fn pack_i16_be(v: i16) -> [u8; 2] {
    v.to_be_bytes()
}

/// Unpack a big-endian signed 16-bit value.
#[inline]
pub fn unpack_i16_be(b: [u8; 2]) -> i16 {
    i16::from_be_bytes(b)
}

/// Pack an unsigned 16-bit value big-endian (IPMI convention).
#[inline]
pub fn pack_u16_be(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

/// Unpack a big-endian unsigned 16-bit value.
#[inline]
pub fn unpack_u16_be(b: [u8; 2]) -> u16 {
    u16::from_be_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_wire_encoding() {
        let req = IpmiRequest::new(netfn::SENSOR, cmd::GET_SENSOR_READING, &[3]);
        let wire = req.encode();
        assert_eq!(wire.len(), REQUEST_WIRE_LEN);

        let decoded = IpmiRequest::decode(&wire).unwrap();
        assert_eq!(decoded.netfn, netfn::SENSOR);
        assert_eq!(decoded.cmd, cmd::GET_SENSOR_READING);
        assert_eq!(decoded.payload(), &[3]);
    }

    #[test]
    fn response_round_trips_through_wire_encoding() {
        let resp = IpmiResponse::ok(&[0x37, 0x00, 0x00, 0x00]);
        let wire = resp.encode();
        assert_eq!(wire.len(), RESPONSE_WIRE_LEN);

        let decoded = IpmiResponse::decode(&wire).unwrap();
        assert_eq!(decoded.completion_code, completion::OK);
        assert_eq!(decoded.payload(), &[0x37, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let short = vec![0u8; 10];
        assert!(IpmiRequest::decode(&short).is_err());
        assert!(IpmiResponse::decode(&short).is_err());
    }

    #[test]
    fn sensor_value_packs_big_endian() {
        // 55.0 * 256 = 14080 = 0x3700
        let raw = (55.0_f64 * 256.0).round() as i16;
        assert_eq!(pack_i16_be(raw), [0x37, 0x00]);
        assert_eq!(unpack_i16_be([0x37, 0x00]), raw);
    }
}
