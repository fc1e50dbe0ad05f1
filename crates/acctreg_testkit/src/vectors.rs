//! SigV4 reference vectors.
//!
//! Each vector signs `GET <url>?after=123` at 2020-09-08T08:08:08Z with the
//! key pair `access` / `secret` in the `us-west-2` / `execute-api` scope.

/// Signing time of every vector, in `X-Amz-Date` form.
pub const VECTOR_AMZ_DATE: &str = "20200908T080808Z";

/// Access key of every vector.
pub const VECTOR_ACCESS_KEY: &str = "access";

/// Secret key of every vector.
pub const VECTOR_SECRET_KEY: &str = "secret";

/// Region of every vector.
pub const VECTOR_REGION: &str = "us-west-2";

/// Service of every vector.
pub const VECTOR_SERVICE: &str = "execute-api";

/// One URL and the signature expected for it.
#[derive(Debug, Clone, Copy)]
pub struct SignatureVector {
    /// Short description.
    pub name: &'static str,
    /// Request URL without the query.
    pub url: &'static str,
    /// Query parameters.
    pub query: &'static [(&'static str, &'static str)],
    /// Expected hex signature.
    pub signature: &'static str,
}

/// Known-good signatures.
pub const SIGNATURE_VECTORS: &[SignatureVector] = &[
    SignatureVector {
        name: "trailing slash",
        url: "https://test.execute-api.us-west-2.amazonaws.com/test/accounts/",
        query: &[("after", "123")],
        signature: "ea7e3e82a74af8bfc7d6412b332c3d2622e91e0855699f31819a67e5c23cdeeb",
    },
    SignatureVector {
        name: "no trailing slash",
        url: "https://test.execute-api.us-west-2.amazonaws.com/test/accounts",
        query: &[("after", "123")],
        signature: "ebad37b5dc20baaadf36da92e249eab247efdc39d44f24f46bde204b62a4401e",
    },
];
