//! Decides, from what the selected model accepts, which content and tools a
//! session offers.

use grab_llm::{ContentPart, ImageAttachment, Message, ModelCapabilities};
use std::collections::HashMap;

/// Provider option asking the backend to route the turn to a vision model.
pub const VISION_REQUEST_OPTION: &str = "Copilot-Vision-Request";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageShaping {
    NoImages,
    Embedded {
        embedded: usize,
        unsupported: usize,
        /// Left out of the message but reachable through the screenshot tool.
        deferred: usize,
        dropped: usize,
    },
    /// Sending screenshots is switched off in configuration.
    Disabled { count: usize },
    /// The model cannot take images; placeholders were added instead.
    VisionUnsupported { count: usize, warning: String },
}

#[derive(Clone, Debug)]
pub struct CapabilityNegotiator {
    model_name: String,
    capabilities: ModelCapabilities,
    send_images: bool,
}

impl CapabilityNegotiator {
    pub fn new(model_name: impl Into<String>, capabilities: ModelCapabilities, send_images: bool) -> Self {
        Self {
            model_name: model_name.into(),
            capabilities,
            send_images,
        }
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    pub fn offers_tools(&self) -> bool {
        self.capabilities.supports_tools
    }

    pub fn offers_screenshot_tool(&self, images: &[ImageAttachment]) -> bool {
        self.capabilities.supports_vision
            && self.capabilities.supports_tools
            && self.send_images
            && !images.is_empty()
    }

    pub fn embeds_tool_images(&self) -> bool {
        self.capabilities.supports_vision && self.send_images
    }

    /// Per-request provider options for the given message set.
    pub fn model_options(&self, messages: &[Message]) -> HashMap<String, String> {
        let mut options = HashMap::new();
        if self.capabilities.supports_vision && messages.iter().any(Message::has_images) {
            options.insert(VISION_REQUEST_OPTION.to_string(), "true".to_string());
        }
        options
    }

    /// Adds the attached images (or placeholders) to the initial user message.
    pub fn shape_user_message(&self, message: &mut Message, images: &[ImageAttachment]) -> ImageShaping {
        if images.is_empty() {
            return ImageShaping::NoImages;
        }

        if !self.capabilities.supports_vision {
            for (index, image) in images.iter().enumerate() {
                message.content.push(ContentPart::text(format!(
                    "[Image attached but not sent: {}]",
                    image.label(index)
                )));
            }
            return ImageShaping::VisionUnsupported {
                count: images.len(),
                warning: format!(
                    "**Note:** The current model ({}) does not support image input. \
                     Screenshots were attached but not sent to the model.",
                    self.model_name
                ),
            };
        }

        if !self.send_images {
            return ImageShaping::Disabled {
                count: images.len(),
            };
        }

        let limit = self
            .capabilities
            .max_images_per_turn
            .unwrap_or(images.len())
            .min(images.len());
        let mut unsupported = 0;
        for (index, image) in images.iter().take(limit).enumerate() {
            message
                .content
                .push(ContentPart::text(format!("[Image: {}]", image.label(index))));
            if image.is_supported_format() {
                let mut normalized = image.clone();
                normalized.mime_type = image.normalized_mime_type();
                message.content.push(ContentPart::image(normalized));
            } else {
                unsupported += 1;
                message.content.push(ContentPart::text(format!(
                    "[Unsupported image format: {}]",
                    image.mime_type
                )));
            }
        }

        let remaining = images.len() - limit;
        let (deferred, dropped) = if remaining > 0 && self.offers_screenshot_tool(images) {
            message.content.push(ContentPart::text(format!(
                "[{remaining} more screenshot(s) available through the get_screenshot tool]"
            )));
            (remaining, 0)
        } else {
            (0, remaining)
        };

        ImageShaping::Embedded {
            embedded: limit - unsupported,
            unsupported,
            deferred,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(count: usize) -> Vec<ImageAttachment> {
        (0..count)
            .map(|index| {
                ImageAttachment::new("image/jpg", "AAAA", Some(format!("shot {index}")))
            })
            .collect()
    }

    fn vision(max_images_per_turn: Option<usize>) -> ModelCapabilities {
        ModelCapabilities {
            supports_vision: true,
            supports_tools: true,
            max_images_per_turn,
        }
    }

    #[test]
    fn embeds_first_image_and_defers_rest_to_tool() {
        let negotiator = CapabilityNegotiator::new("gpt-vision", vision(Some(1)), true);
        let mut message = Message::user("fix it");
        let shaping = negotiator.shape_user_message(&mut message, &images(3));

        assert_eq!(
            shaping,
            ImageShaping::Embedded {
                embedded: 1,
                unsupported: 0,
                deferred: 2,
                dropped: 0
            }
        );
        let ContentPart::Image { image } = &message.content[2] else {
            panic!("expected embedded image");
        };
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(message.text().contains("2 more screenshot(s)"));

        let options = negotiator.model_options(std::slice::from_ref(&message));
        assert_eq!(options.get(VISION_REQUEST_OPTION).map(String::as_str), Some("true"));
    }

    #[test]
    fn drops_extra_images_when_tool_cannot_be_offered() {
        let capabilities = ModelCapabilities {
            supports_tools: false,
            ..vision(Some(1))
        };
        let negotiator = CapabilityNegotiator::new("m", capabilities, true);
        let mut message = Message::user("x");
        let shaping = negotiator.shape_user_message(&mut message, &images(2));
        assert_eq!(
            shaping,
            ImageShaping::Embedded {
                embedded: 1,
                unsupported: 0,
                deferred: 0,
                dropped: 1
            }
        );
        assert!(!negotiator.offers_tools());
    }

    #[test]
    fn unsupported_formats_become_text() {
        let negotiator = CapabilityNegotiator::new("m", vision(None), true);
        let mut message = Message::user("x");
        let attached = vec![ImageAttachment::new("image/bmp", "AAAA", None)];
        let shaping = negotiator.shape_user_message(&mut message, &attached);
        assert!(matches!(shaping, ImageShaping::Embedded { unsupported: 1, embedded: 0, .. }));
        assert!(message.text().contains("[Unsupported image format: image/bmp]"));
        assert!(!message.has_images());
    }

    #[test]
    fn non_vision_model_gets_placeholders_and_warning() {
        let negotiator = CapabilityNegotiator::new("text-only", ModelCapabilities::default(), true);
        let mut message = Message::user("x");
        let shaping = negotiator.shape_user_message(&mut message, &images(1));

        let ImageShaping::VisionUnsupported { count, warning } = shaping else {
            panic!("expected vision warning");
        };
        assert_eq!(count, 1);
        assert!(warning.contains("text-only"));
        assert!(!message.has_images());
        assert!(message.text().contains("[Image attached but not sent: shot 0]"));
        assert!(!negotiator.offers_screenshot_tool(&images(1)));
        assert!(negotiator.model_options(&[message]).is_empty());
    }

    #[test]
    fn disabled_sending_leaves_message_untouched() {
        let negotiator = CapabilityNegotiator::new("m", vision(Some(1)), false);
        let mut message = Message::user("x");
        let shaping = negotiator.shape_user_message(&mut message, &images(2));
        assert_eq!(shaping, ImageShaping::Disabled { count: 2 });
        assert_eq!(message.content.len(), 1);
        assert!(!negotiator.embeds_tool_images());
        assert!(!negotiator.offers_screenshot_tool(&images(2)));
    }
}
