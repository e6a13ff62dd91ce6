use super::*;

impl SessionLoop {
    pub(super) fn build_request(&self) -> TurnRequest {
        let tools = if self.negotiator.offers_tools() {
            self.tools.definitions()
        } else {
            Vec::new()
        };
        TurnRequest {
            model_options: self.negotiator.model_options(&self.messages),
            messages: self.messages.clone(),
            tools,
        }
    }

    /// Relays text to the sink as it arrives. `Ok(None)` means cancelled.
    pub(super) async fn consume_stream(
        &self,
        mut stream: FragmentStream,
        cancel: &CancellationToken,
    ) -> Result<Option<FragmentAccumulator>, SDKError> {
        let mut accumulator = FragmentAccumulator::new();
        let mut thinking = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = stream.next() => next,
            };
            match next {
                None => break,
                Some(Ok(StreamFragment::Text(text))) => {
                    self.sink.markdown(&text);
                    thinking.push_str(&text);
                    accumulator.push(StreamFragment::Text(text));
                }
                Some(Ok(fragment @ StreamFragment::ToolCall(_))) => accumulator.push(fragment),
                Some(Err(SDKError::Cancelled)) => return Ok(None),
                Some(Err(error)) => return Err(error),
            }
        }

        self.publish_thinking(&thinking);
        if !thinking.trim().is_empty() && !accumulator.tool_calls().is_empty() {
            self.sink.markdown("\n");
        }
        Ok(Some(accumulator))
    }

    fn publish_thinking(&self, thinking: &str) {
        let trimmed = thinking.trim();
        let Some(request_id) = self.request_id.as_deref() else {
            return;
        };
        if trimmed.is_empty() {
            return;
        }
        self.bus.publish_status(
            request_id,
            StatusEvent::thinking(excerpt(trimmed, self.config.status_excerpt_chars)),
        );
    }

    /// Runs the calls in order; one result per call, failures included.
    pub(super) async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if let Some(request_id) = self.request_id.as_deref() {
                self.bus
                    .publish_status(request_id, StatusEvent::tool(&call.name, call.input.clone()));
            }
            self.sink.markdown(&format!("\nUsing **{}**\n", call.name));
            debug!(turn = self.turns, tool = %call.name, call_id = %call.call_id, "executing tool call");

            let output = self.tools.execute(call, self.tool_context()).await;
            let mut content = vec![ContentPart::text(output.text)];
            if let Some(image) = output.image {
                if self.negotiator.embeds_tool_images() && image.is_supported_format() {
                    let mut image = image;
                    image.mime_type = image.normalized_mime_type();
                    content.push(ContentPart::image(image));
                } else {
                    debug!(tool = %call.name, "tool image not forwarded to the model");
                }
            }
            results.push(ToolResult {
                call_id: call.call_id.clone(),
                content,
            });
        }
        results
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            sink: Arc::clone(&self.sink),
            bus: Arc::clone(&self.bus),
            request_id: self.request_id.clone(),
            workspace: Arc::clone(&self.workspace),
            config: Arc::clone(&self.config),
        }
    }

    pub(super) fn fail(&self, error: SDKError) -> LoopExit {
        if error.is_cancelled() {
            return LoopExit::Cancelled;
        }
        error!(
            request_id = self.request_id.as_deref().unwrap_or("-"),
            turn = self.turns,
            state = %self.state,
            error = %error,
            "chat loop failed"
        );
        self.sink
            .markdown(&format!("\n\n**Error:** Error in chat loop: {error}\n"));
        LoopExit::Failed(error.to_string())
    }
}
