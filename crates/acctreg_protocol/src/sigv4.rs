//! AWS Signature Version 4 for bodiless requests.
//!
//! Only what the account catalog needs is covered: a request without a
//! payload, `content-type`, `host` and `x-amz-date` as signed headers, plus
//! `x-amz-security-token` when temporary credentials are used.
//!
//! Query parameters are encoded strictly (RFC 3986 unreserved set only), so
//! `+` in a timestamp offset becomes `%2B` both on the wire and in the
//! canonical request.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm name.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Content type sent with every signed request.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Layout of the `X-Amz-Date` header.
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const SCOPE_TERMINATOR: &str = "aws4_request";

/// Credential material used to derive the signing key.
#[derive(Clone, Copy)]
pub struct SigningKeys<'a> {
    /// Access key id.
    pub access_key_id: &'a str,
    /// Secret access key.
    pub secret_access_key: &'a str,
    /// Session token for temporary credentials.
    pub session_token: Option<&'a str>,
}

/// The request being signed.
#[derive(Clone, Copy)]
pub struct SigningRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Target URL; its query string is ignored in favour of `query`.
    pub url: &'a Url,
    /// Decoded query parameters.
    pub query: &'a [(String, String)],
    /// Region of the credential scope.
    pub region: &'a str,
    /// Service of the credential scope.
    pub service: &'a str,
    /// Signing time.
    pub time: DateTime<Utc>,
}

/// Output of a signing operation.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Headers to attach to the request, ordered by name.
    pub headers: BTreeMap<String, String>,
    /// The canonical request that was hashed.
    pub canonical_request: String,
    /// The string that was signed.
    pub string_to_sign: String,
    /// Hex-encoded signature.
    pub signature: String,
}

/// Signs a request.
pub fn sign(request: &SigningRequest<'_>, keys: &SigningKeys<'_>) -> ProtocolResult<Signature> {
    let host = host_header(request.url)?;
    let amz_date = request.time.format(AMZ_DATE_FORMAT).to_string();
    let date = request.time.format("%Y%m%d").to_string();

    let mut canonical_headers = BTreeMap::new();
    canonical_headers.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
    canonical_headers.insert("host".to_string(), host.clone());
    canonical_headers.insert("x-amz-date".to_string(), amz_date.clone());
    if let Some(token) = keys.session_token {
        canonical_headers.insert("x-amz-security-token".to_string(), token.trim().to_string());
    }
    let signed_headers = canonical_headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = canonical_request(
        request.method,
        &canonical_uri(request.url.path(), request.service != "s3"),
        &canonical_query(request.query),
        &canonical_headers,
        &signed_headers,
        &sha256_hex(b""),
    );

    let scope = format!(
        "{date}/{}/{}/{SCOPE_TERMINATOR}",
        request.region, request.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(keys.secret_access_key, &date, request.region, request.service)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    let mut headers = BTreeMap::new();
    headers.insert(
        "Authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            keys.access_key_id
        ),
    );
    headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
    headers.insert("Host".to_string(), host);
    headers.insert("X-Amz-Date".to_string(), amz_date);
    if let Some(token) = keys.session_token {
        headers.insert("X-Amz-Security-Token".to_string(), token.trim().to_string());
    }

    Ok(Signature {
        headers,
        canonical_request,
        string_to_sign,
        signature,
    })
}

fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &BTreeMap<String, String>,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let mut out = String::new();
    out.push_str(&method.to_ascii_uppercase());
    out.push('\n');
    out.push_str(uri);
    out.push('\n');
    out.push_str(query);
    out.push('\n');
    for (name, value) in headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(signed_headers);
    out.push('\n');
    out.push_str(payload_hash);
    out
}

/// Value of the `Host` header for a URL; the port appears only when it is
/// not the scheme default.
pub fn host_header(url: &Url) -> ProtocolResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ProtocolError::InvalidUrl(format!("{url} has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Canonical URI for a URL path.
///
/// Segments are normalized to a single encoding first, then encoded once
/// more when `double_encode` is set (every service except S3).
pub fn canonical_uri(path: &str, double_encode: bool) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let encoded = uri_encode(&percent_decode(path), false);
    if double_encode {
        uri_encode(&encoded, false)
    } else {
        encoded
    }
}

/// Canonical query string: strictly encoded pairs sorted by key, then value.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(value) = decoded {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> ProtocolResult<Vec<u8>> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, SCOPE_TERMINATOR.as_bytes())
}

fn hmac(key: &[u8], data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| ProtocolError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Parses an `X-Amz-Date` value.
pub fn parse_amz_date(value: &str) -> ProtocolResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), AMZ_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProtocolError::InvalidAuthorization(format!("bad x-amz-date: {e}")))
}

/// The fields of a SigV4 `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    /// Access key id from the credential scope.
    pub access_key_id: String,
    /// `YYYYMMDD` date from the credential scope.
    pub date: String,
    /// Region from the credential scope.
    pub region: String,
    /// Service from the credential scope.
    pub service: String,
    /// Lower-case signed header names.
    pub signed_headers: Vec<String>,
    /// Hex signature.
    pub signature: String,
}

/// Parses a SigV4 `Authorization` header.
pub fn parse_authorization(value: &str) -> ProtocolResult<AuthorizationHeader> {
    let rest = value
        .trim()
        .strip_prefix(ALGORITHM)
        .ok_or_else(|| ProtocolError::InvalidAuthorization("unsupported algorithm".into()))?;

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;
    for part in rest.split(',') {
        let Some((key, val)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "Credential" => credential = Some(val),
            "SignedHeaders" => signed_headers = Some(val),
            "Signature" => signature = Some(val),
            _ => {}
        }
    }

    let missing = |field: &str| ProtocolError::InvalidAuthorization(format!("missing {field}"));
    let credential = credential.ok_or_else(|| missing("Credential"))?;
    let scope: Vec<&str> = credential.split('/').collect();
    if scope.len() != 5 || scope[4] != SCOPE_TERMINATOR {
        return Err(ProtocolError::InvalidAuthorization(format!(
            "bad credential scope: {credential}"
        )));
    }

    Ok(AuthorizationHeader {
        access_key_id: scope[0].to_string(),
        date: scope[1].to_string(),
        region: scope[2].to_string(),
        service: scope[3].to_string(),
        signed_headers: signed_headers
            .ok_or_else(|| missing("SignedHeaders"))?
            .split(';')
            .map(str::to_string)
            .collect(),
        signature: signature.ok_or_else(|| missing("Signature"))?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vector_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 8, 8, 8, 8).unwrap()
    }

    fn sign_vector(url: &str) -> Signature {
        let url = Url::parse(url).unwrap();
        let query = vec![("after".to_string(), "123".to_string())];
        let request = SigningRequest {
            method: "GET",
            url: &url,
            query: &query,
            region: "us-west-2",
            service: "execute-api",
            time: vector_time(),
        };
        let keys = SigningKeys {
            access_key_id: "access",
            secret_access_key: "secret",
            session_token: None,
        };
        sign(&request, &keys).unwrap()
    }

    #[test]
    fn known_vector_with_trailing_slash() {
        let signed = sign_vector("https://test.execute-api.us-west-2.amazonaws.com/test/accounts/");
        assert_eq!(
            signed.headers["Authorization"],
            "AWS4-HMAC-SHA256 Credential=access/20200908/us-west-2/execute-api/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=ea7e3e82a74af8bfc7d6412b332c3d2622e91e0855699f31819a67e5c23cdeeb"
        );
        assert_eq!(
            signed.headers["Host"],
            "test.execute-api.us-west-2.amazonaws.com"
        );
        assert_eq!(signed.headers["X-Amz-Date"], "20200908T080808Z");
        assert_eq!(signed.headers["Content-Type"], "application/json");
    }

    #[test]
    fn known_vector_without_trailing_slash() {
        let signed = sign_vector("https://test.execute-api.us-west-2.amazonaws.com/test/accounts");
        assert_eq!(
            signed.signature,
            "ebad37b5dc20baaadf36da92e249eab247efdc39d44f24f46bde204b62a4401e"
        );
    }

    #[test]
    fn headers_are_ordered_by_name() {
        let signed = sign_vector("https://test.execute-api.us-west-2.amazonaws.com/test/accounts/");
        let names: Vec<&str> = signed.headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Authorization", "Content-Type", "Host", "X-Amz-Date"]);
    }

    #[test]
    fn session_token_is_signed() {
        let url = Url::parse("https://example.com/accounts").unwrap();
        let request = SigningRequest {
            method: "GET",
            url: &url,
            query: &[],
            region: "us-east-1",
            service: "execute-api",
            time: vector_time(),
        };
        let keys = SigningKeys {
            access_key_id: "AKID",
            secret_access_key: "secret",
            session_token: Some("token"),
        };
        let signed = sign(&request, &keys).unwrap();
        assert_eq!(signed.headers["X-Amz-Security-Token"], "token");
        assert!(signed.headers["Authorization"]
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
    }

    #[test]
    fn plus_is_strictly_encoded() {
        assert_eq!(uri_encode("2020-08-12T00:00:00+02:00", true), "2020-08-12T00%3A00%3A00%2B02%3A00");
        assert_eq!(uri_encode("a b/c", true), "a%20b%2Fc");
        assert_eq!(uri_encode("a b/c", false), "a%20b/c");
    }

    #[test]
    fn canonical_query_sorts_by_key_then_value() {
        let params = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "z".to_string()),
            ("a".to_string(), "y".to_string()),
        ];
        assert_eq!(canonical_query(&params), "a=y&a=z&b=2");
        assert_eq!(canonical_query(&[]), "");
    }

    #[test]
    fn canonical_uri_double_encodes() {
        assert_eq!(canonical_uri("", true), "/");
        assert_eq!(canonical_uri("/a%20b/", false), "/a%20b/");
        assert_eq!(canonical_uri("/a%20b/", true), "/a%2520b/");
    }

    #[test]
    fn host_includes_non_default_port() {
        let url = Url::parse("http://localhost:8080/accounts").unwrap();
        assert_eq!(host_header(&url).unwrap(), "localhost:8080");
        let url = Url::parse("https://example.com:443/accounts").unwrap();
        assert_eq!(host_header(&url).unwrap(), "example.com");
    }

    #[test]
    fn authorization_header_parses() {
        let signed = sign_vector("https://test.execute-api.us-west-2.amazonaws.com/test/accounts/");
        let parsed = parse_authorization(&signed.headers["Authorization"]).unwrap();
        assert_eq!(parsed.access_key_id, "access");
        assert_eq!(parsed.date, "20200908");
        assert_eq!(parsed.region, "us-west-2");
        assert_eq!(parsed.service, "execute-api");
        assert_eq!(parsed.signed_headers, vec!["content-type", "host", "x-amz-date"]);
        assert_eq!(parsed.signature, signed.signature);

        assert!(parse_authorization("Bearer abc").is_err());
        assert!(parse_authorization("AWS4-HMAC-SHA256 Credential=a/b, Signature=x").is_err());
    }

    #[test]
    fn amz_date_parses() {
        assert_eq!(parse_amz_date("20200908T080808Z").unwrap(), vector_time());
        assert!(parse_amz_date("2020-09-08").is_err());
    }
}
