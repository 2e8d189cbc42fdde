// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::constants::{
    AWS_QUERY_ENCODE_SET, FORM_CONTENT_TYPE, SERVICE, X_AMZ_CONTENT_SHA_256, X_AMZ_DATE,
    X_AMZ_SECURITY_TOKEN,
};
use crate::signing_key::SigningKeyCache;
use crate::Credential;
use async_trait::async_trait;
use http::request::Parts;
use http::{header, HeaderValue, Uri};
use log::debug;
use percent_encoding::utf8_percent_encode;
use putmetric_core::hash::{hex_hmac_sha256, hex_sha256};
use putmetric_core::time::{format_date, format_iso8601, DateTime};
use putmetric_core::{Context, Error, Result, SignRequest, SigningRequest};
use std::fmt::Write;

/// RequestSigner that implement AWS SigV4 for form encoded POST bodies.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
///
/// Only `host`, `x-amz-content-sha256`, `x-amz-date` and, when a session
/// token is present, `x-amz-security-token` are signed. `content-type` and
/// `content-length` are attached unsigned.
#[derive(Debug)]
pub struct RequestSigner {
    service: String,
    cache: &'static SigningKeyCache,
}

impl Default for RequestSigner {
    fn default() -> Self {
        Self::new(SERVICE)
    }
}

impl RequestSigner {
    /// Create a new signer for the given service name, e.g. `monitoring`.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.into(),
            cache: SigningKeyCache::global(),
        }
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        body: &[u8],
        cred: &Self::Credential,
        now: DateTime,
    ) -> Result<()> {
        let region = cred.region();
        // Requests without a host go to the regional endpoint of the
        // credential, so the host always matches the signing scope.
        if req.uri.authority().is_none() {
            req.uri = regional_endpoint(&self.service, region)?;
        }
        let mut signed_req = SigningRequest::build(req)?;

        // canonicalize context
        let signed_headers = canonicalize_header(&mut signed_req, cred, body, now)?;

        // build canonical request and string to sign.
        let creq = canonical_request_string(&signed_req, &signed_headers)?;
        debug!("calculated canonical request: {creq}");
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"
        let date = format_date(now);
        let scope = format!("{}/{}/{}/aws4_request", date, region, self.service);
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "AWS4-HMAC-SHA256")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", &encoded_req)?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            self.cache
                .get_or_derive(&cred.secret_access_key, &date, region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            scope,
            signed_headers.join(";"),
            signature
        ))?;
        authorization.set_sensitive(true);

        signed_req
            .headers
            .insert(header::AUTHORIZATION, authorization);
        signed_req.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(FORM_CONTENT_TYPE),
        );
        signed_req
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        // Apply to the request.
        signed_req.apply(req)
    }
}

/// Regional endpoint of `service`, e.g. `https://monitoring.us-east-1.amazonaws.com/`.
pub(crate) fn regional_endpoint(service: &str, region: &str) -> Result<Uri> {
    if region.is_empty() {
        return Err(Error::config_invalid(
            "region is required to build the default endpoint",
        ));
    }
    Ok(format!("https://{service}.{region}.amazonaws.com/").parse()?)
}

/// Insert the headers covered by the signature and return their sorted names.
fn canonicalize_header(
    ctx: &mut SigningRequest,
    cred: &Credential,
    body: &[u8],
    now: DateTime,
) -> Result<Vec<&'static str>> {
    // Header names and values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    for (_, value) in ctx.headers.iter_mut() {
        SigningRequest::header_value_normalize(value)
    }

    let host = HeaderValue::from_str(ctx.authority.as_str())?;
    ctx.headers.insert(header::HOST, host);
    ctx.headers.insert(
        X_AMZ_CONTENT_SHA_256,
        HeaderValue::try_from(hex_sha256(body))?,
    );
    ctx.headers
        .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);

    // Sorted ascending by construction.
    let mut signed = vec![header::HOST.as_str(), X_AMZ_CONTENT_SHA_256, X_AMZ_DATE];

    if let Some(token) = &cred.session_token {
        let mut value = HeaderValue::from_str(token)?;
        SigningRequest::header_value_normalize(&mut value);
        // Set token value sensitive to valid leaking.
        value.set_sensitive(true);

        ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        signed.push(X_AMZ_SECURITY_TOKEN);
    } else {
        ctx.headers.remove(X_AMZ_SECURITY_TOKEN);
    }

    Ok(signed)
}

fn canonical_request_string(ctx: &SigningRequest, signed_headers: &[&str]) -> Result<String> {
    // 512 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(512);

    // Insert method
    writeln!(f, "{}", ctx.method)?;
    // Insert path
    writeln!(f, "{}", ctx.path)?;
    // Insert query
    writeln!(f, "{}", ctx.query)?;
    // Insert signed headers
    for name in signed_headers {
        let value = ctx
            .headers
            .get(*name)
            .ok_or_else(|| Error::request_invalid(format!("signed header {name} is missing")))?;
        writeln!(f, "{}:{}", name, value.to_str()?)?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{}", ctx.headers[X_AMZ_CONTENT_SHA_256].to_str()?)?;

    Ok(f)
}

/// Percent-encode a single form key or value with the strict SigV4 set.
fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, &AWS_QUERY_ENCODE_SET).to_string()
}

/// Convert structured pairs into a form encoded body.
///
/// Pairs keep the caller's order, they are not re-sorted. Empty keys are
/// rejected.
pub fn form_body<K, V>(pairs: &[(K, V)]) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut s = String::new();
    for (idx, (k, v)) in pairs.iter().enumerate() {
        let (k, v) = (k.as_ref(), v.as_ref());
        if k.is_empty() {
            return Err(Error::request_invalid(format!(
                "form key at position {idx} is empty"
            )));
        }

        if idx != 0 {
            s.push('&');
        }
        s.push_str(&percent_encode(k));
        s.push('=');
        s.push_str(&percent_encode(v));
    }

    Ok(s)
}
