use pixseek_domain::{
    DomainError, Notice, PreviewImage, PreviewTicket, SearchMetrics, SearchState, SelectedImage,
};

use crate::{ApplicationError, PreviewStore, SearchJob, SearchPipeline};

/// The orchestrator. Owns the selected image, its preview ticket, the search
/// state and the `has_searched` flag, and sequences every transition between
/// them. All mutation goes through the four operations below; rendering
/// layers only read.
pub struct SearchSession {
    pipeline: Box<dyn SearchPipeline>,
    previews: Box<dyn PreviewStore>,
    selection: Option<SelectedImage>,
    preview_ticket: Option<PreviewTicket>,
    state: SearchState,
    has_searched: bool,
    next_token: u64,
    active_token: Option<u64>,
}

impl SearchSession {
    pub fn new(pipeline: Box<dyn SearchPipeline>, previews: Box<dyn PreviewStore>) -> Self {
        Self {
            pipeline,
            previews,
            selection: None,
            preview_ticket: None,
            state: SearchState::Idle,
            has_searched: false,
            next_token: 0,
            active_token: None,
        }
    }

    /// Offers a candidate file to the session. A candidate whose declared
    /// MIME type is outside the accepted set is ignored silently: no state
    /// changes and `Ok(false)` is returned. An accepted candidate replaces
    /// the current selection, releasing the previous preview ticket before
    /// acquiring the new one, and resets results and `has_searched` even if
    /// the same file is offered twice.
    pub fn select_image(
        &mut self,
        name: &str,
        declared_mime: &str,
        bytes: Vec<u8>,
    ) -> Result<bool, ApplicationError> {
        let image = match SelectedImage::from_declared_mime(name, declared_mime, bytes) {
            Ok(image) => image,
            Err(DomainError::UnsupportedMediaType(_)) => return Ok(false),
        };
        self.install_selection(image)?;
        Ok(true)
    }

    fn install_selection(&mut self, image: SelectedImage) -> Result<(), ApplicationError> {
        if let Some(ticket) = self.preview_ticket.take() {
            self.previews.release(ticket);
        }
        let ticket = self.previews.acquire(&image)?;
        self.preview_ticket = Some(ticket);
        self.selection = Some(image);
        self.state = SearchState::Idle;
        self.has_searched = false;
        // Any search still in flight belongs to the previous selection.
        self.active_token = None;
        Ok(())
    }

    /// Drops the selection and everything derived from it.
    pub fn clear_selection(&mut self) {
        if let Some(ticket) = self.preview_ticket.take() {
            self.previews.release(ticket);
        }
        self.selection = None;
        self.state = SearchState::Idle;
        self.has_searched = false;
        self.active_token = None;
    }

    /// Starts a search for the current selection. With nothing selected this
    /// surfaces a notice and changes no state; while a search is already
    /// loading it is a no-op regardless of what the UI allowed.
    pub fn trigger_search(&mut self) -> Result<Option<Notice>, ApplicationError> {
        if self.state.is_loading() {
            return Ok(None);
        }
        let Some(image) = self.selection.clone() else {
            return Ok(Some(Notice::error(
                "No image selected",
                "Please upload an image first.",
            )));
        };

        self.next_token += 1;
        let token = self.next_token;
        self.pipeline.submit(SearchJob { token, image })?;
        self.active_token = Some(token);
        self.state = SearchState::Loading;
        self.has_searched = true;
        Ok(None)
    }

    /// Drains at most one delivery from the pipeline. A delivery whose token
    /// does not match the one currently outstanding is from a selection the
    /// user has since cleared or replaced and is discarded without touching
    /// state.
    pub fn poll(&mut self) -> Result<Option<Notice>, ApplicationError> {
        let Some(delivery) = self.pipeline.try_receive()? else {
            return Ok(None);
        };
        if self.active_token != Some(delivery.token) {
            return Ok(None);
        }
        self.active_token = None;

        match delivery.outcome {
            Ok(results) => {
                let notice = if results.is_empty() {
                    Notice::info(
                        "No similar images found",
                        "Try uploading a different image.",
                    )
                } else {
                    let count = results.len();
                    let plural = if count == 1 { "" } else { "s" };
                    Notice::info(
                        "Search complete",
                        format!("Found {count} similar image{plural}."),
                    )
                };
                self.state = SearchState::Succeeded(results);
                Ok(Some(notice))
            }
            Err(failure) => {
                let notice = Notice::error("Search failed", failure.to_string());
                self.state = SearchState::Failed(failure);
                Ok(Some(notice))
            }
        }
    }

    pub fn selection(&self) -> Option<&SelectedImage> {
        self.selection.as_ref()
    }

    pub fn preview_ticket(&self) -> Option<PreviewTicket> {
        self.preview_ticket
    }

    pub fn preview_image(&self) -> Option<PreviewImage> {
        self.preview_ticket
            .and_then(|ticket| self.previews.preview(ticket))
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn is_searching(&self) -> bool {
        self.state.is_loading()
    }

    pub fn has_searched(&self) -> bool {
        self.has_searched
    }

    pub fn can_search(&self) -> bool {
        self.selection.is_some() && !self.state.is_loading()
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }

    pub fn metrics(&self) -> Result<SearchMetrics, ApplicationError> {
        self.pipeline.metrics()
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        if let Some(ticket) = self.preview_ticket.take() {
            self.previews.release(ticket);
        }
    }
}
