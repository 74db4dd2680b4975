//! Utility functions for creating s3 clients and modifying s3 requests
use crate::error::MapError;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpRequest;

const DEFAULT_REGION: &str = "us-east-1";

/// Client for an S3-compatible endpoint, credentials taken from a named profile.
pub async fn client_from_profile(profile_name: &str, endpoint: Option<&str>) -> Client {
    let base_config = aws_config::from_env()
        .profile_name(profile_name)
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&base_config)
        .region(Region::new(DEFAULT_REGION))
        .force_path_style(true);
    if let Some(url) = endpoint {
        builder = builder.endpoint_url(url);
    }

    Client::from_conf(builder.build())
}

/// Client for an S3-compatible endpoint with a static access/secret key pair.
pub fn client_with_keys(endpoint: Option<&str>, access_key: &str, secret_key: &str) -> Client {
    let credentials = Credentials::new(access_key, secret_key, None, None, "eo-fetch");

    let mut builder = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(DEFAULT_REGION))
        .credentials_provider(credentials)
        .force_path_style(true);
    if let Some(url) = endpoint {
        builder = builder.endpoint_url(url);
    }

    Client::from_conf(builder.build())
}

/// Some S3-compatible object stores (Copernicus eodata, CloudFerro) reject requests that
/// carry the param 'x-id=GetObject'. This function can be passed to the
/// `GetObjectFluentBuilder::map_request()` method to strip the offending param from the
/// generated uri.
pub fn strip_x_id_get_object_param_from_uri(
    req: HttpRequest,
) -> std::result::Result<HttpRequest, MapError> {
    let mut r = req.try_clone().ok_or(MapError::Clone)?;
    let uri = strip_x_id_param(r.uri());
    r.set_uri(uri.clone())
        .map_err(|e| MapError::Uri(format!("{uri}: {e}")))?;
    Ok(r)
}

fn strip_x_id_param(uri: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|param| !param.is_empty() && *param != "x-id=GetObject")
        .collect();
    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}
