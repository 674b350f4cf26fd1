use rand::Rng;
use time::OffsetDateTime;

pub const ID_PREFIX: &str = "ean";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    // BASE36 is ascii
    String::from_utf8(out).unwrap_or_default()
}

/// New opaque identifier: `ean-<millis base36>-<9 random base36 chars>`.
///
/// Unique only in practice and only within one local store.
pub fn generate() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos().max(0) as u128 / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", ID_PREFIX, to_base36(millis), suffix)
}
