//! AWS Signature V4 request signing.
//!
//! Covers exactly what the bridge needs: header-based signing for the `s3`
//! service with a precomputed (or empty) payload hash. The canonical query
//! builder is shared with the stream reader so the bytes on the wire are
//! the bytes that were signed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HOST, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;

use super::Credentials;
use crate::error::{BridgeError, Result};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Region used when the caller does not override one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// SHA-256 of an empty body.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// Hex SHA-256 of a request payload.
pub fn payload_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Percent-encode per the strict SigV4 rules: unreserved characters pass
/// through, everything else becomes uppercase `%XX`. `/` survives in path
/// position when `encode_slash` is false.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Sorted, strictly-encoded query string.
pub fn canonical_query(pairs: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(key, value)| (uri_encode(key, true), uri_encode(value, true)))
        .collect();
    encoded.sort();

    let parts: Vec<String> = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    parts.join("&")
}

/// Stamp `request` with `x-amz-date`, `x-amz-content-sha256`, `host`, and
/// the SigV4 `authorization` header. The request's path and query must
/// already be in canonical form (see [`uri_encode`] / [`canonical_query`]).
pub fn sign_request(
    request: &mut Request,
    credentials: &Credentials,
    region: &str,
    payload_hash: &str,
) -> Result<()> {
    sign_request_at(request, credentials, region, payload_hash, Utc::now())
}

fn sign_request_at(
    request: &mut Request,
    credentials: &Credentials,
    region: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let host = host_header(request.url())?;
    let method = request.method().as_str().to_string();
    let canonical_uri = match request.url().path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    let canonical_query = request.url().query().unwrap_or("").to_string();

    let canonical_headers = format!(
        "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n"
    );
    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}"
    );

    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let mut key = hmac_sha256(
        format!("AWS4{}", credentials.secret_key).as_bytes(),
        date.as_bytes(),
    );
    key = hmac_sha256(&key, region.as_bytes());
    key = hmac_sha256(&key, SERVICE.as_bytes());
    key = hmac_sha256(&key, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        credentials.access_key
    );

    let headers = request.headers_mut();
    headers.insert(HOST, header_value(&host)?);
    headers.insert("x-amz-date", header_value(&amz_date)?);
    headers.insert("x-amz-content-sha256", header_value(payload_hash)?);
    headers.insert(AUTHORIZATION, header_value(&authorization)?);
    Ok(())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| BridgeError::Internal(format!("invalid header value: {err}")))
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| BridgeError::InvalidEndpoint(url.to_string()))?;
    // `Url::port` is None for the scheme's default port, matching how the
    // client emits the header.
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::Method;

    #[test]
    fn uri_encode_is_strict() {
        assert_eq!(uri_encode("a b/c:*", true), "a%20b%2Fc%3A%2A");
        assert_eq!(uri_encode("a b/c:*", false), "a%20b/c%3A%2A");
        assert_eq!(uri_encode("AZaz09-._~", true), "AZaz09-._~");
    }

    #[test]
    fn canonical_query_sorts_by_encoded_pair() {
        let query = canonical_query(&[
            ("suffix", ".jpg"),
            ("prefix", ""),
            ("events", "s3:ObjectRemoved:*"),
            ("events", "s3:ObjectCreated:*"),
        ]);
        assert_eq!(
            query,
            "events=s3%3AObjectCreated%3A%2A&events=s3%3AObjectRemoved%3A%2A&prefix=&suffix=.jpg"
        );
    }

    #[test]
    fn signed_request_carries_the_expected_headers() {
        let mut request = Request::new(
            Method::GET,
            Url::parse("http://localhost:9000/camera?prefix=&suffix=.jpg").unwrap(),
        );
        let now = Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap();

        sign_request_at(
            &mut request,
            &Credentials::new("AKIDEXAMPLE", "secret"),
            DEFAULT_REGION,
            EMPTY_PAYLOAD_SHA256,
            now,
        )
        .unwrap();

        assert_eq!(request.headers()["host"], "localhost:9000");
        assert_eq!(request.headers()["x-amz-date"], "20260808T120000Z");
        assert_eq!(
            request.headers()["x-amz-content-sha256"],
            EMPTY_PAYLOAD_SHA256
        );

        let authorization = request.headers()["authorization"].to_str().unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260808/us-east-1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = authorization.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn same_input_signs_identically() {
        let now = Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap();
        let credentials = Credentials::new("ak", "sk");

        let mut first = Request::new(Method::GET, Url::parse("http://host:9000/b").unwrap());
        let mut second = Request::new(Method::GET, Url::parse("http://host:9000/b").unwrap());
        sign_request_at(&mut first, &credentials, DEFAULT_REGION, EMPTY_PAYLOAD_SHA256, now)
            .unwrap();
        sign_request_at(&mut second, &credentials, DEFAULT_REGION, EMPTY_PAYLOAD_SHA256, now)
            .unwrap();

        assert_eq!(
            first.headers()[AUTHORIZATION],
            second.headers()[AUTHORIZATION]
        );
    }
}
