//! HTTP client for the Prometheus query API

use super::{
    LabelValues, MetricsSource, QueryData, QueryResponse, Sample, Series, TimeRange,
    VectorSample, QUERY_TIMEOUT,
};
use crate::error::{ConfigError, QueryError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{trace, warn};
use url::Url;

/// Prometheus HTTP API client
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    /// Create a new client for the API rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme {:?} in {}",
                base_url.scheme(),
                base_url
            ))
            .into());
        }
        // keep any path prefix when joining API paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<(T, Vec<String>), QueryError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| QueryError::Decode(format!("invalid path {:?}: {}", path, e)))?;

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(path = %path, status = %status, bytes = body.len(), "Prometheus response");

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(QueryError::Decode(e.to_string())),
            Err(_) => {
                return Err(QueryError::Api {
                    error_type: status.to_string(),
                    message: body,
                })
            }
        };

        if envelope.status != "success" {
            return Err(QueryError::Api {
                error_type: envelope.error_type.unwrap_or_else(|| status.to_string()),
                message: envelope.error.unwrap_or_default(),
            });
        }
        if !envelope.warnings.is_empty() {
            warn!(path = %path, warnings = ?envelope.warnings, "Prometheus returned warnings");
        }

        let data = envelope
            .data
            .ok_or_else(|| QueryError::Decode("response has no data".to_string()))?;
        Ok((data, envelope.warnings))
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    fn describe(&self) -> String {
        self.base_url.to_string()
    }

    async fn label_values(
        &self,
        label: &str,
        range: &TimeRange,
    ) -> Result<LabelValues, QueryError> {
        let path = format!("api/v1/label/{}/values", label);
        let params = [
            ("start", format_timestamp(range.start)),
            ("end", format_timestamp(range.end)),
        ];
        let (values, warnings): (Vec<String>, _) = self.get(&path, &params).await?;
        Ok(LabelValues { values, warnings })
    }

    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<QueryResponse, QueryError> {
        let params = [("query", query.to_string()), ("time", format_timestamp(at))];
        let (data, warnings): (RawData, _) = self.get("api/v1/query", &params).await?;
        Ok(QueryResponse {
            data: data.into_query_data()?,
            warnings,
        })
    }

    async fn query_range(
        &self,
        query: &str,
        range: &TimeRange,
    ) -> Result<QueryResponse, QueryError> {
        let params = [
            ("query", query.to_string()),
            ("start", format_timestamp(range.start)),
            ("end", format_timestamp(range.end)),
            ("step", format!("{}", range.step.as_secs())),
        ];
        let (data, warnings): (RawData, _) = self.get("api/v1/query_range", &params).await?;
        Ok(QueryResponse {
            data: data.into_query_data()?,
            warnings,
        })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    format!("{:.3}", at.timestamp_millis() as f64 / 1000.0)
}

// Wire types

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// `[<unix_time>, "<value>"]`
type RawSample = (f64, String);

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum RawData {
    Vector(Vec<RawVectorSample>),
    Matrix(Vec<RawSeries>),
    Scalar(RawSample),
    String(RawSample),
}

#[derive(Debug, Deserialize)]
struct RawVectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: RawSample,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<RawSample>,
}

fn parse_sample((timestamp, value): RawSample) -> Result<Sample, QueryError> {
    let value = value
        .parse::<f64>()
        .map_err(|e| QueryError::Decode(format!("invalid sample value {:?}: {}", value, e)))?;
    Ok(Sample { timestamp, value })
}

impl RawData {
    fn into_query_data(self) -> Result<QueryData, QueryError> {
        Ok(match self {
            RawData::Vector(samples) => QueryData::Vector(
                samples
                    .into_iter()
                    .map(|s| {
                        Ok(VectorSample {
                            metric: s.metric,
                            value: parse_sample(s.value)?,
                        })
                    })
                    .collect::<Result<_, QueryError>>()?,
            ),
            RawData::Matrix(series) => QueryData::Matrix(
                series
                    .into_iter()
                    .map(|s| {
                        Ok(Series {
                            metric: s.metric,
                            values: s
                                .values
                                .into_iter()
                                .map(parse_sample)
                                .collect::<Result<_, QueryError>>()?,
                        })
                    })
                    .collect::<Result<_, QueryError>>()?,
            ),
            RawData::Scalar(sample) => QueryData::Scalar(parse_sample(sample)?),
            RawData::String((_, text)) => QueryData::String(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;
    use std::time::Duration;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(PrometheusClient::new("not a url").is_err());
        assert!(PrometheusClient::new("ftp://prometheus:9090").is_err());
    }

    #[test]
    fn test_base_path_is_preserved() {
        let client = PrometheusClient::new("http://localhost:9090/prometheus").unwrap();
        assert_eq!(
            client.base_url().join("api/v1/query").unwrap().as_str(),
            "http://localhost:9090/prometheus/api/v1/query"
        );
    }

    #[tokio::test]
    async fn test_instant_vector_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "up".into()),
                Matcher::UrlEncoded("time".into(), "1704153600.000".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{"container":"web"},"value":[1704153600,"2.5"]},
                    {"metric":{"container":"sidecar"},"value":[1704153600,"NaN"]}
                ]}}"#,
            )
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let response = client.query("up", range().end).await.unwrap();
        mock.assert_async().await;

        let QueryData::Vector(samples) = response.data else {
            panic!("expected vector");
        };
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].metric["container"], "web");
        assert_eq!(samples[0].value.value, 2.5);
        assert!(samples[1].value.value.is_nan());
        assert!(response.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_range_matrix_query_with_warnings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "rate(x[5m])".into()),
                Matcher::UrlEncoded("step".into(), "3600".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"status":"success","warnings":["partial response"],"data":{"resultType":"matrix","result":[
                    {"metric":{},"values":[[1704067200,"1"],[1704070800,"+Inf"],[1704074400,"3"]]}
                ]}}"#,
            )
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let response = client.query_range("rate(x[5m])", &range()).await.unwrap();
        mock.assert_async().await;

        assert_eq!(response.warnings, vec!["partial response".to_string()]);
        let QueryData::Matrix(series) = response.data else {
            panic!("expected matrix");
        };
        assert_eq!(series.len(), 1);
        assert!(series[0].metric.is_empty());
        assert_eq!(series[0].values.len(), 3);
        assert!(series[0].values[1].value.is_infinite());
    }

    #[tokio::test]
    async fn test_label_values() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/label/namespace/values")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":["default","kube-system","shop"]}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let labels = client.label_values("namespace", &range()).await.unwrap();
        assert_eq!(labels.values, vec!["default", "kube-system", "shop"]);
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error at char 3"}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let err = client.query("up{", range().end).await.unwrap_err();
        match err {
            QueryError::Api { error_type, message } => {
                assert_eq!(error_type, "bad_data");
                assert!(message.contains("parse error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let err = client.query("up", range().end).await.unwrap_err();
        assert!(matches!(err, QueryError::Api { .. }));
    }

    #[tokio::test]
    async fn test_malformed_success_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"histogram","result":[]}}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url()).unwrap();
        let err = client.query("up", range().end).await.unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }
}
