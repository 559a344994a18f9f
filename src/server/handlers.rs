// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request routing and the `/list`, `/get` and `/health` endpoints.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde::Serialize;

use super::cache::ProxyCache;
use crate::logging::{LoggingConfig, RequestInfo};
use crate::store::{ProxyListing, ProxySecret, ProxySecretDetail, StoreError};
use crate::{debug_fmt, error_fmt, info_fmt};

/// Response header telling whether the payload was served from cache.
pub const CACHE_HIT: &str = "cache-hit";

pub(crate) async fn handle_request<B>(
    req: Request<B>,
    cache: Arc<ProxyCache>,
    logging: Arc<LoggingConfig>,
    client_ip: String,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let info = RequestInfo::new(
        req.method().as_str(),
        req.uri().path(),
        &client_ip,
        propagated_trace_id(req.headers(), &logging),
    );
    debug_fmt!(info.context(), "Received request from {}", info.remote_addr);

    let (parts, _body) = req.into_parts();
    let response = respond(&cache, &parts.method, &parts.uri, &info).await;

    info_fmt!(
        info.context(),
        "{} in {}ms",
        response.status().as_u16(),
        info.elapsed_ms()
    );
    Ok(response)
}

fn propagated_trace_id(headers: &HeaderMap, logging: &LoggingConfig) -> Option<String> {
    if !logging.propagate_trace_id {
        return None;
    }
    headers
        .get(logging.trace_id_header.as_str())
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Route one request.
pub async fn respond(
    cache: &ProxyCache,
    method: &Method,
    uri: &Uri,
    info: &RequestInfo,
) -> Response<Full<Bytes>> {
    if method != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    let query = parse_query(uri.query().unwrap_or_default());
    let param = |name: &str| query.get(name).map(String::as_str).unwrap_or_default();

    match uri.path() {
        "/list" => list(cache, param("project"), info).await,
        "/get" => get(cache, param("project"), param("shortName"), param("fullName"), info).await,
        "/health" => text(StatusCode::OK, "OK"),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn list(cache: &ProxyCache, project: &str, info: &RequestInfo) -> Response<Full<Bytes>> {
    info_fmt!(info.context(), "Retrieving from {project}");

    let (entries, hit) = match cache.list(project).await {
        Ok(listed) => listed,
        Err(err) => return store_failure(info, err),
    };

    info_fmt!(info.context(), "Retrieved {} keys from {project}", entries.len());
    let listing = ProxyListing {
        secrets: entries
            .iter()
            .map(|entry| ProxySecret::from_entry(entry.as_ref()))
            .collect(),
    };
    json(&listing, hit, info)
}

async fn get(
    cache: &ProxyCache,
    project: &str,
    short_name: &str,
    full_name: &str,
    info: &RequestInfo,
) -> Response<Full<Bytes>> {
    let (secret, hit) = match cache.get(project, short_name).await {
        Ok(found) => found,
        Err(err) => return store_failure(info, err),
    };

    info_fmt!(info.context(), "Sending {full_name}");
    let detail = ProxySecretDetail::new(secret.entry.as_ref(), &secret.data);
    json(&detail, hit, info)
}

fn store_failure(info: &RequestInfo, err: StoreError) -> Response<Full<Bytes>> {
    error_fmt!(info.context(), "{err}");
    text(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

fn json<T: Serialize>(body: &T, hit: bool, info: &RequestInfo) -> Response<Full<Bytes>> {
    let data = match serde_json::to_vec(body) {
        Ok(data) => data,
        Err(err) => {
            error_fmt!(info.context(), "Failed to encode response: {err}");
            return text(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(data)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        CACHE_HIT,
        HeaderValue::from_static(if hit { "true" } else { "false" }),
    );
    response
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Decode `a=1&b=two+words` into a map; the first occurrence of a name wins.
pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode(name))
            .or_insert_with(|| decode(value));
    }
    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
