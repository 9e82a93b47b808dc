use chrono::Utc;
use rand::Rng;

/// How many times creation retries on a request id collision before giving
/// up.
pub const REQUEST_ID_ATTEMPTS: usize = 5;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_SUFFIX_LEN: usize = 5;

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Builds a short human-readable request id: prefix, base36 millisecond
/// timestamp, then five random base36 characters. Collision-resistant, not
/// collision-proof; callers retry on a unique-constraint violation.
pub fn generate_request_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, to_base36(millis), suffix)
}
