//! Blocking client for the external point-to-shape decode service.
//!
//! The service takes a batch of text prompts plus a session identifier and
//! answers with parallel lists of shape types and point lists. Responses
//! are all-or-nothing: any transport, status, parse or pairing failure
//! discards the whole response and the caller mutates nothing. No retries.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct DecodeClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Serialize)]
struct DecodeRequest<'a> {
    prompts: &'a [String],
    session_id: &'a str,
}

#[derive(Deserialize)]
struct DecodeResponse {
    shape_types: Vec<String>,
    points: Vec<Vec<(f64, f64)>>,
}

/// One decoded shape, paired back to the prompt at the same index.
#[derive(Debug, Clone)]
pub struct DecodedShape {
    pub shape_type: String,
    pub points: Vec<(f64, f64)>,
}

impl DecodeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build decode service client")?;
        Ok(DecodeClient {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn decode(&self, prompts: &[String], session_id: &str) -> Result<Vec<DecodedShape>> {
        let response = self
            .client
            .post(format!("{}/decode", self.base_url.trim_end_matches('/')))
            .json(&DecodeRequest {
                prompts,
                session_id,
            })
            .send()
            .context("decode service request failed")?
            .error_for_status()
            .context("decode service returned an error status")?;
        let body: DecodeResponse = response
            .json()
            .context("decode service response was not valid JSON")?;
        pair_response(prompts.len(), body)
    }
}

fn pair_response(expected: usize, body: DecodeResponse) -> Result<Vec<DecodedShape>> {
    if body.shape_types.len() != body.points.len() {
        bail!(
            "decode service returned {} shape types but {} point lists",
            body.shape_types.len(),
            body.points.len()
        );
    }
    if body.shape_types.len() != expected {
        bail!(
            "decode service answered {} shapes for {} prompts",
            body.shape_types.len(),
            expected
        );
    }
    Ok(body
        .shape_types
        .into_iter()
        .zip(body.points)
        .map(|(shape_type, points)| DecodedShape { shape_type, points })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_parallel_lists() {
        let body = DecodeResponse {
            shape_types: vec!["polygon".into(), "point".into()],
            points: vec![vec![(1.0, 2.0), (3.0, 4.0)], vec![(5.0, 6.0)]],
        };
        let shapes = pair_response(2, body).unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].shape_type, "polygon");
        assert_eq!(shapes[1].points, vec![(5.0, 6.0)]);
    }

    #[test]
    fn rejects_mismatched_list_lengths() {
        let body = DecodeResponse {
            shape_types: vec!["polygon".into()],
            points: vec![],
        };
        assert!(pair_response(1, body).is_err());
    }

    #[test]
    fn rejects_wrong_shape_count() {
        let body = DecodeResponse {
            shape_types: vec!["polygon".into()],
            points: vec![vec![(1.0, 1.0)]],
        };
        assert!(pair_response(2, body).is_err());
    }
}
