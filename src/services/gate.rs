use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::ShareConfig;

type HmacSha256 = Hmac<Sha256>;

// Fixed key: the MAC only normalises both PINs to equal-length tags before comparison.
const PIN_COMPARE_KEY: &[u8] = b"pawshare-pin-compare";

/// Outcome of checking a request against a share's PIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    Granted,
    PinRequired,
    PinIncorrect,
}

impl GateResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, GateResult::Granted)
    }
}

/// PIN gate for share views. Stateless, so callers may wrap it in a limiter.
pub struct AccessGate;

impl AccessGate {
    pub fn evaluate(config: &ShareConfig, supplied_pin: Option<&str>) -> GateResult {
        let expected = match config.pin.as_deref() {
            Some(pin) if !pin.is_empty() => pin,
            _ => return GateResult::Granted,
        };

        let supplied = match supplied_pin {
            Some(pin) if !pin.is_empty() => pin,
            _ => return GateResult::PinRequired,
        };

        if pins_match(expected, supplied) {
            GateResult::Granted
        } else {
            GateResult::PinIncorrect
        }
    }
}

/// Compare through HMAC tags so the work done does not depend on where, or whether,
/// the two PINs first differ.
fn pins_match(expected: &str, supplied: &str) -> bool {
    let expected_tag = pin_tag(expected);
    let mut mac = match HmacSha256::new_from_slice(PIN_COMPARE_KEY) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(supplied.as_bytes());
    mac.verify_slice(&expected_tag).is_ok()
}

fn pin_tag(pin: &str) -> Vec<u8> {
    match HmacSha256::new_from_slice(PIN_COMPARE_KEY) {
        Ok(mut mac) => {
            mac.update(pin.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}
