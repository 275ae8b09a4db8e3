//! Image upload check
//!
//! Starts a download-sourced VM image import on Harvester and waits for
//! it to finish. Image downloads can take many minutes; the default
//! timeout is correspondingly generous, and a failed import condition
//! short-circuits the wait instead of burning the whole budget.
//!
//! ## Options
//!
//! - `image_url`: source URL for the image (default: Ubuntu focal cloud
//!   image)
//! - `timeout`: budget for the download (default: 30m)
//! - `interval`: poll delay (default: run-wide `poll_interval`)

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::info;

use super::traits::{
    expect_ready, expect_status, finish_check, Check, CheckContext, CheckError, CheckOptions,
    CheckResult, InStep, StepFailure, StepResult,
};
use crate::utils::poll::{await_condition_or_fail, FetchError, FetchFuture, Observation};

const DEFAULT_IMAGE_URL: &str =
    "http://cloud-images.ubuntu.com/releases/focal/release/ubuntu-20.04-server-cloudimg-amd64-disk-kvm.img";

/// VM image upload check
pub struct ImageUploadCheck;

/// `status.progress == 100` marks a finished import; a missing progress
/// field means the importer has not started reporting yet.
pub(crate) fn import_complete(body: &Value) -> bool {
    body.pointer("/status/progress").and_then(Value::as_u64) == Some(100)
}

/// An `Imported` condition gone `False` with reason `ImportFailed` is
/// terminal; keeping polling after it appears never succeeds.
pub(crate) fn import_failed(body: &Value) -> bool {
    body.pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Imported")
                    && c.get("status").and_then(Value::as_str) == Some("False")
                    && c.get("reason").and_then(Value::as_str) == Some("ImportFailed")
            })
        })
        .unwrap_or(false)
}

#[async_trait]
impl Check for ImageUploadCheck {
    fn name(&self) -> &'static str {
        "image"
    }

    fn description(&self) -> &'static str {
        "Upload a VM image and wait for the import to finish"
    }

    async fn run(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
    ) -> Result<CheckResult, CheckError> {
        let start = Instant::now();
        let mut steps = Vec::new();
        let flow = self.flow(ctx, opts, &mut steps).await;
        finish_check(self.name(), steps, start.elapsed(), flow)
    }

    fn default_options(&self) -> CheckOptions {
        CheckOptions {
            timeout: Some(Duration::from_secs(1800)),
            interval: None,
            extra: Default::default(),
        }
    }
}

impl ImageUploadCheck {
    async fn flow(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
        steps: &mut Vec<StepResult>,
    ) -> Result<String, StepFailure> {
        let name = ctx.names.unique().to_string();
        let url = opts
            .get_extra::<String>("image_url")
            .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string());

        info!(image = %name, url = %url, "starting image import");
        let resp = ctx
            .harvester
            .images()
            .create_by_url(&name, &url)
            .await
            .in_step("create-image")?;
        expect_status(&resp, 201, "create image").in_step("create-image")?;
        steps.push(StepResult::passed("create-image").with_detail("url", &url));

        let harvester = ctx.harvester.clone();
        let image = name.clone();
        let outcome = await_condition_or_fail(
            move || {
                let harvester = harvester.clone();
                let image = image.clone();
                Box::pin(async move {
                    harvester
                        .images()
                        .get(&image)
                        .await
                        .map(Observation::from)
                        .map_err(FetchError::from)
                }) as FetchFuture
            },
            |_, body| import_complete(body),
            |_, body| import_failed(body),
            ctx.poll_opts(opts),
        )
        .await
        .in_step("await-import")?;
        expect_ready(outcome, "image import").in_step("await-import")?;
        steps.push(StepResult::passed("await-import"));

        info!(image = %name, "image import complete");
        Ok(format!("image {name} imported"))
    }
}
