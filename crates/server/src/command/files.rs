// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing::{debug, warn};

use super::{CommandContext, CommandHandler};
use crate::error::CommandError;
use crate::protocol::Response;

pub struct Download;

impl CommandHandler for Download {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let path = ctx.path("file")?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            warn!(path = %path.display(), "download failed: {e}");
            CommandError::unable(format!("Unable to download file '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = content.len(), "download");
        Ok(Response::success(content))
    }
}

pub struct Upload;

impl CommandHandler for Upload {
    fn execute(&self, ctx: &CommandContext<'_>) -> Result<Response, CommandError> {
        let path = ctx.path("file")?;
        let content = ctx.message.text("content").ok_or_else(|| {
            CommandError::malformed("For 'upload', mandatory parameter is: 'content'")
        })?;
        std::fs::write(&path, content.as_bytes()).map_err(|e| {
            warn!(path = %path.display(), "upload failed: {e}");
            CommandError::unable(format!("Unable to upload file '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = content.len(), "upload");
        Ok(Response::success(""))
    }
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
