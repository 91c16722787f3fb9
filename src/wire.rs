//! Byte-framed wire format for the long-polling probe endpoint

use percent_encoding::percent_decode_str;

use crate::model::ConfigKey;

/// Separates config entries in the probe body.
pub const LINE_SEPARATOR: &str = "\u{1}";

/// Separates fields within a config entry.
pub const WORD_SEPARATOR: &str = "\u{2}";

/// Form field carrying the framed probe payload.
pub const LISTENING_CONFIGS: &str = "Listening-Configs";

/// Probe timeout header. The spelling is what the server expects.
pub const LONG_PULLING_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";

/// Encode the tracked configs into the probe request payload.
///
/// Each entry is `dataId ^B group ^B md5 [^B tenant] ^A`.
pub fn encode_probe(configs: &[(ConfigKey, String)]) -> String {
    let mut out = String::new();
    for (key, md5) in configs {
        out.push_str(&key.data_id);
        out.push_str(WORD_SEPARATOR);
        out.push_str(&key.group);
        out.push_str(WORD_SEPARATOR);
        out.push_str(md5);
        if !key.tenant.is_empty() {
            out.push_str(WORD_SEPARATOR);
            out.push_str(&key.tenant);
        }
        out.push_str(LINE_SEPARATOR);
    }
    out
}

/// Parse the probe response body into the keys the server reported changed.
///
/// The body is percent-decoded once, then split into lines and fields.
/// Lines with fewer than two fields are skipped; fields past the tenant are
/// ignored.
pub fn parse_probe_response(body: &str) -> Vec<ConfigKey> {
    let decoded = percent_decode_str(body.trim()).decode_utf8_lossy();

    let mut keys = Vec::new();
    for line in decoded.split(LINE_SEPARATOR) {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(WORD_SEPARATOR).collect();
        if fields.len() < 2 {
            continue;
        }
        let tenant = fields.get(2).copied().unwrap_or("");
        match ConfigKey::new(fields[0], fields[1], tenant) {
            Ok(key) => keys.push(key),
            Err(_) => continue,
        }
    }
    keys
}
