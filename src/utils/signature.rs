use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parsed `x-signature` header: `ts=<unix>,v1=<hex digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub ts: String,
    pub v1: String,
}

pub fn parse_signature_header(raw: &str) -> Option<SignatureHeader> {
    let mut ts = None;
    let mut v1 = None;
    for part in raw.split(',') {
        let (key, value) = match part.trim().split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        match key.trim() {
            "ts" => ts = Some(value.trim().to_string()),
            "v1" => v1 = Some(value.trim().to_ascii_lowercase()),
            _ => {}
        }
    }
    Some(SignatureHeader { ts: ts?, v1: v1? })
}

fn manifest(resource_id: &str, request_id: Option<&str>, ts: &str) -> String {
    let mut out = String::new();
    if !resource_id.is_empty() {
        out.push_str(&format!("id:{};", resource_id.to_ascii_lowercase()));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        out.push_str(&format!("request-id:{};", request_id));
    }
    out.push_str(&format!("ts:{};", ts));
    out
}

pub fn sign(secret: &str, resource_id: &str, request_id: Option<&str>, ts: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(manifest(resource_id, request_id, ts).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a provider notification signature.
pub fn verify_signature(
    secret: &str,
    header: &str,
    request_id: Option<&str>,
    resource_id: &str,
) -> bool {
    let Some(parsed) = parse_signature_header(header) else {
        return false;
    };
    let Some(expected) = sign(secret, resource_id, request_id, &parsed.ts) else {
        return false;
    };
    subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), parsed.v1.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_in_any_order() {
        let parsed = parse_signature_header("v1=ABCDEF, ts=1704908010").unwrap();
        assert_eq!(parsed.ts, "1704908010");
        assert_eq!(parsed.v1, "abcdef");
        assert!(parse_signature_header("ts=1").is_none());
        assert!(parse_signature_header("garbage").is_none());
    }

    #[test]
    fn accepts_matching_signature() {
        let digest = sign("whsec", "PAY-123", Some("req-1"), "1704908010").unwrap();
        let header = format!("ts=1704908010,v1={}", digest);
        assert!(verify_signature("whsec", &header, Some("req-1"), "PAY-123"));
    }

    #[test]
    fn rejects_tampered_inputs() {
        let digest = sign("whsec", "pay-123", Some("req-1"), "1704908010").unwrap();
        let header = format!("ts=1704908010,v1={}", digest);
        assert!(!verify_signature("other", &header, Some("req-1"), "pay-123"));
        assert!(!verify_signature("whsec", &header, Some("req-2"), "pay-123"));
        assert!(!verify_signature("whsec", &header, Some("req-1"), "pay-999"));
        let stale = format!("ts=1704908011,v1={}", digest);
        assert!(!verify_signature("whsec", &stale, Some("req-1"), "pay-123"));
    }
}
