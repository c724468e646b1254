//! Request signing.
//!
//! Every authenticated call carries an `X-WonderPush-Authorization` header
//! holding an HMAC-SHA1 signature over a canonical representation of the
//! request. The canonical string is built from the method, the full URL
//! without its query string, and the sorted set of parameters from both the
//! query string and the body, so the same request always signs the same
//! bytes regardless of parameter ordering or transport placement.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{ApiError, ApiResult};
use crate::request::{HttpMethod, RequestParams};

/// Header carrying the request signature.
pub const AUTHORIZATION_HEADER: &str = "X-WonderPush-Authorization";

const SIGNATURE_METHOD: &str = "0";

type HmacSha1 = Hmac<Sha1>;

/// Computes the authorization header value for a request.
///
/// Returns `Ok(None)` for unsigned GET requests when no client secret is
/// configured. Any other method without a secret is refused before it can
/// reach the network.
pub fn authorization_header(
    method: HttpMethod,
    base_url: &str,
    resource: &str,
    params: &RequestParams,
    client_secret: Option<&str>,
) -> ApiResult<Option<String>> {
    let Some(secret) = client_secret else {
        if method == HttpMethod::Get {
            return Ok(None);
        }
        return Err(ApiError::Signing(format!(
            "a client secret is required to sign {method} requests"
        )));
    };

    let canonical = canonical_string(method, base_url, resource, params)?;
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Signing(e.to_string()))?;
    mac.update(canonical.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(Some(format!(
        "WonderPush sig=\"{}\", meth=\"{}\"",
        urlencoding::encode(&signature),
        SIGNATURE_METHOD
    )))
}

/// Builds the string the signature is computed over:
/// `METHOD&encode(url-without-query)&sorted-encoded-params&`.
///
/// Parameters from the resource's query string are percent-decoded and merged
/// with the body parameters. Every name and value is percent-encoded up front
/// and the union is sorted by the encoded `(name, value)` pair, so a name
/// holding a reserved character orders by its `%XX` form. Each pair then
/// contributes `encode(encoded_name + "=" + encoded_value)`, joined with an
/// encoded ampersand; the trailing `&` stands for the empty body segment.
fn canonical_string(
    method: HttpMethod,
    base_url: &str,
    resource: &str,
    params: &RequestParams,
) -> ApiResult<String> {
    let (path, query) = match resource.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (resource, None),
    };

    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| (encode_component(name), encode_component(value)))
        .collect();
    if let Some(query) = query {
        for part in query.split('&').filter(|part| !part.is_empty()) {
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            pairs.push((
                encode_component(&decode_component(name)?),
                encode_component(&decode_component(value)?),
            ));
        }
    }
    // The sort key is the encoded pair, not the raw one.
    pairs.sort();

    let encoded: Vec<String> = pairs
        .iter()
        .map(|(name, value)| urlencoding::encode(&format!("{name}={value}")).into_owned())
        .collect();

    let url = format!("{base_url}{path}");
    Ok(format!(
        "{}&{}&{}&",
        method.as_str(),
        urlencoding::encode(&url),
        encoded.join("%26")
    ))
}

fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn decode_component(raw: &str) -> ApiResult<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ApiError::Signing(format!("invalid query string encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_URL: &str = "https://api.example.com/v1";

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_canonical_string_sorts_and_double_encodes() {
        let canonical = canonical_string(
            HttpMethod::Post,
            BASE_URL,
            "/installation",
            &params(&[("overwrite", "false"), ("body", "x y")]),
        )
        .unwrap();
        assert_eq!(
            canonical,
            "POST&https%3A%2F%2Fapi.example.com%2Fv1%2Finstallation\
             &body%3Dx%2520y%26overwrite%3Dfalse&"
        );
    }

    #[test]
    fn test_canonical_string_merges_query_parameters() {
        let canonical = canonical_string(
            HttpMethod::Get,
            BASE_URL,
            "/things?b=2&a=1",
            &params(&[("accessToken", "tok")]),
        )
        .unwrap();
        assert_eq!(
            canonical,
            "GET&https%3A%2F%2Fapi.example.com%2Fv1%2Fthings\
             &a%3D1%26accessToken%3Dtok%26b%3D2&"
        );
    }

    #[test]
    fn test_canonical_string_without_params() {
        let canonical =
            canonical_string(HttpMethod::Post, BASE_URL, "/x", &RequestParams::new()).unwrap();
        assert_eq!(canonical, "POST&https%3A%2F%2Fapi.example.com%2Fv1%2Fx&&");
    }

    #[test]
    fn test_header_value_matches_known_signature() {
        let header = authorization_header(
            HttpMethod::Post,
            BASE_URL,
            "/installation",
            &params(&[("overwrite", "false"), ("body", "x y")]),
            Some("secret"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            header,
            "WonderPush sig=\"5QITEIz2%2BDXertcrZzde2IUfhAI%3D\", meth=\"0\""
        );
    }

    #[test]
    fn test_signature_covers_query_parameters() {
        let header = authorization_header(
            HttpMethod::Get,
            BASE_URL,
            "/things?b=2&a=1",
            &params(&[("accessToken", "tok")]),
            Some("s3cr3t"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            header,
            "WonderPush sig=\"6bfPoAE9qnHn1fVkQdCSS9Rzdqg%3D\", meth=\"0\""
        );
    }

    #[test]
    fn test_signature_independent_of_parameter_order() {
        let a = authorization_header(
            HttpMethod::Post,
            BASE_URL,
            "/x",
            &params(&[("a", "1"), ("b", "2")]),
            Some("k"),
        )
        .unwrap()
        .unwrap();
        let b = authorization_header(
            HttpMethod::Post,
            BASE_URL,
            "/x",
            &params(&[("b", "2"), ("a", "1")]),
            Some("k"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "WonderPush sig=\"KsZFljCRnWBWTxT7Fe8At6bloLI%3D\", meth=\"0\"");
    }

    #[test]
    fn test_signature_encodes_special_characters() {
        let canonical = canonical_string(
            HttpMethod::Post,
            BASE_URL,
            "/x",
            &params(&[("q", "a*b+c~d e")]),
        )
        .unwrap();
        assert_eq!(
            canonical,
            "POST&https%3A%2F%2Fapi.example.com%2Fv1%2Fx&q%3Da%252Ab%252Bc~d%2520e&"
        );
        let header = authorization_header(
            HttpMethod::Post,
            BASE_URL,
            "/x",
            &params(&[("q", "a*b+c~d e")]),
            Some("k"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            header,
            "WonderPush sig=\"BQUceFuvcQz7XZmsYNKiPtzEKK8%3D\", meth=\"0\""
        );
    }

    #[test]
    fn test_reserved_characters_sort_by_encoded_form() {
        // "a/b" encodes to "a%2Fb", which orders before "a-b" even though
        // the raw names compare the other way around.
        let pairs = params(&[("a/b", "1"), ("a-b", "2")]);
        let canonical = canonical_string(HttpMethod::Post, BASE_URL, "/x", &pairs).unwrap();
        assert_eq!(
            canonical,
            "POST&https%3A%2F%2Fapi.example.com%2Fv1%2Fx&a%252Fb%3D1%26a-b%3D2&"
        );
        let header = authorization_header(HttpMethod::Post, BASE_URL, "/x", &pairs, Some("k"))
            .unwrap()
            .unwrap();
        assert_eq!(
            header,
            "WonderPush sig=\"DA9CphvY2KYNqjb2b6zChR5bcko%3D\", meth=\"0\""
        );
    }

    #[test]
    fn test_unsigned_get_without_secret() {
        let header =
            authorization_header(HttpMethod::Get, BASE_URL, "/x", &RequestParams::new(), None)
                .unwrap();
        assert_eq!(header, None);
    }

    #[test]
    fn test_post_without_secret_is_refused() {
        let err =
            authorization_header(HttpMethod::Post, BASE_URL, "/x", &RequestParams::new(), None)
                .unwrap_err();
        assert!(matches!(err, ApiError::Signing(_)));
    }
}
