use grab_llm::{ImageAttachment, ToolDefinition};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{GET_SCREENSHOT_TOOL, RegisteredTool, ToolOutput, optional_u64_argument};
use crate::ToolError;

/// Builds the per-session screenshot tool over the images attached to
/// `request_id`.
pub fn screenshot_tool(request_id: &str, images: Arc<Vec<ImageAttachment>>) -> RegisteredTool {
    let available = images
        .iter()
        .enumerate()
        .map(|(index, image)| format!("  - Index {index}: {} ({})", image.label(index), image.mime_type))
        .collect::<Vec<_>>()
        .join("\n");
    let last_index = images.len().saturating_sub(1);
    let request_id = request_id.to_string();

    RegisteredTool {
        definition: ToolDefinition {
            name: GET_SCREENSHOT_TOOL.to_string(),
            description: format!(
                "Retrieve a screenshot image attached to this request. Use this tool when you need to \
                 visually analyze a screenshot to understand UI elements, layout, errors, or other visual \
                 information.\n\nAvailable screenshots:\n{available}\n\nCall this tool with the index of \
                 the screenshot you want to view. The image will be returned for visual analysis."
            ),
            parameters: json!({
                "type": "object",
                "required": ["index"],
                "properties": {
                    "index": {
                        "type": "number",
                        "description": format!("The index of the screenshot to retrieve (0 to {last_index})")
                    }
                }
            }),
        },
        executor: Arc::new(move |args, context| {
            let images = Arc::clone(&images);
            let request_id = request_id.clone();
            Box::pin(async move {
                let index = optional_u64_argument(&args, "index")?
                    .ok_or_else(|| ToolError::Validation("missing required argument 'index'".to_string()))?
                    as usize;
                if images.is_empty() {
                    return Ok(ToolOutput::text("No screenshots available for this request."));
                }
                let Some(image) = images.get(index) else {
                    return Ok(ToolOutput::text(format!(
                        "Invalid screenshot index. Please use an index between 0 and {}.",
                        images.len() - 1
                    )));
                };
                let label = image.label(index);
                debug!(request_id, index, label, "screenshot requested by the model");

                context
                    .sink
                    .markdown(&format!("\n**Viewing Screenshot {}:**\n\n", index + 1));
                if let Some(description) = &image.description {
                    context.sink.markdown(&format!("*{description}*\n\n"));
                }
                let saved =
                    save_screenshot(&context.config.screenshot_dir(), &request_id, index, image).await?;
                context.sink.reference(&saved);

                Ok(ToolOutput::with_image(
                    format!("Screenshot {} retrieved: {label}", index + 1),
                    ImageAttachment {
                        description: Some(label),
                        ..image.clone()
                    },
                ))
            })
        }),
    }
}

/// Writes the decoded image to `dir/screenshot-<id>-<index>.<ext>` so hosts can display it.
pub(crate) async fn save_screenshot(
    dir: &Path,
    request_id: &str,
    index: usize,
    image: &ImageAttachment,
) -> Result<PathBuf, ToolError> {
    let bytes = image
        .decode()
        .map_err(|error| ToolError::Execution(format!("screenshot {index} is not valid base64: {error}")))?;
    tokio::fs::create_dir_all(dir).await?;
    let extension = image
        .normalized_mime_type()
        .split_once('/')
        .map(|(_, subtype)| subtype.to_string())
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or_else(|| "png".to_string());
    let path = dir.join(format!("screenshot-{request_id}-{index}.{extension}"));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
