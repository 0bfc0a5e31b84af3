use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use log::{info, warn};
use pixseek_adapters::{
    present_results, BackgroundImageLoader, BackgroundSearchPipeline, DecodedPreviewStore,
    HttpSearchBackend, MockSearchBackend, ResultsView,
};
use pixseek_application::{ImageFetcher, SearchBackend, SearchSession};
use pixseek_domain::{
    ImageFormat, Notice, NoticeSeverity, PreviewTicket, ResultImageRef, SearchState,
};

use crate::config::AppConfig;

const WINDOW_WIDTH: f32 = 980.0;
const WINDOW_HEIGHT: f32 = 760.0;
const PREVIEW_MAX_SIDE: f32 = 260.0;
const RESULT_CELL_SIDE: f32 = 160.0;
const TOAST_WIDTH: f32 = 320.0;
const TOAST_STACK_STEP: f32 = 72.0;
const TOAST_TTL: Duration = Duration::from_secs(4);
const FADE_IN_SECS: f32 = 0.35;
const FADE_STAGGER_SECS: f32 = 0.06;
const PICKER_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

pub fn launch_window(config: &AppConfig) -> Result<(), String> {
    let app = PixseekApp::from_config(config)?;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([WINDOW_WIDTH, WINDOW_HEIGHT])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native("pixseek", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|error| format!("failed to start UI: {error}"))
}

pub(crate) fn build_search_session(config: &AppConfig) -> Result<SearchSession, String> {
    let (backend, _fetcher) = build_backend_pair(config)?;
    let pipeline = BackgroundSearchPipeline::new(backend);
    Ok(SearchSession::new(
        Box::new(pipeline),
        Box::new(DecodedPreviewStore::new()),
    ))
}

fn build_backend_pair(
    config: &AppConfig,
) -> Result<(Arc<dyn SearchBackend>, Arc<dyn ImageFetcher>), String> {
    if config.use_mock_backend {
        info!("using mock search backend");
        let backend = Arc::new(MockSearchBackend::new());
        let search: Arc<dyn SearchBackend> = backend.clone();
        let fetch: Arc<dyn ImageFetcher> = backend;
        return Ok((search, fetch));
    }
    info!("using search backend at {}", config.base_url);
    let backend = Arc::new(
        HttpSearchBackend::new(config.base_url.as_str()).map_err(|error| error.to_string())?,
    );
    let search: Arc<dyn SearchBackend> = backend.clone();
    let fetch: Arc<dyn ImageFetcher> = backend;
    Ok((search, fetch))
}

enum ThumbSlot {
    Pending,
    Ready(egui::TextureHandle),
    Failed,
}

struct ActiveToast {
    notice: Notice,
    shown_at: Instant,
}

struct PixseekApp {
    session: SearchSession,
    loader: BackgroundImageLoader,
    preview_texture: Option<(PreviewTicket, egui::TextureHandle)>,
    thumbnails: HashMap<String, ThumbSlot>,
    toasts: Vec<ActiveToast>,
    last_state: SearchState,
    state_changed_at: Instant,
}

impl PixseekApp {
    fn from_config(config: &AppConfig) -> Result<Self, String> {
        let (backend, fetcher) = build_backend_pair(config)?;
        let session = SearchSession::new(
            Box::new(BackgroundSearchPipeline::new(backend)),
            Box::new(DecodedPreviewStore::new()),
        );
        Ok(Self {
            session,
            loader: BackgroundImageLoader::new(fetcher),
            preview_texture: None,
            thumbnails: HashMap::new(),
            toasts: Vec::new(),
            last_state: SearchState::Idle,
            state_changed_at: Instant::now(),
        })
    }

    fn push_toast(&mut self, notice: Notice) {
        self.toasts.push(ActiveToast {
            notice,
            shown_at: Instant::now(),
        });
    }

    fn drain_session(&mut self) {
        loop {
            match self.session.poll() {
                Ok(Some(notice)) => self.push_toast(notice),
                Ok(None) => break,
                Err(error) => {
                    warn!("search pipeline poll failed: {error}");
                    break;
                }
            }
        }
    }

    fn drain_loader(&mut self, ctx: &egui::Context) {
        loop {
            match self.loader.try_receive() {
                Ok(Some(loaded)) => {
                    let url = loaded.reference.url().to_string();
                    // Ignore thumbnails for results no longer on screen.
                    let Some(slot) = self.thumbnails.get_mut(&url) else {
                        continue;
                    };
                    *slot = match loaded.outcome {
                        Ok(preview) => {
                            let image = egui::ColorImage::from_rgba_unmultiplied(
                                [preview.width as usize, preview.height as usize],
                                &preview.rgba,
                            );
                            let handle = ctx.load_texture(
                                format!("thumb-{url}"),
                                image,
                                egui::TextureOptions::LINEAR,
                            );
                            ThumbSlot::Ready(handle)
                        }
                        Err(error) => {
                            info!("thumbnail for {url} unavailable: {error}");
                            ThumbSlot::Failed
                        }
                    };
                }
                Ok(None) => break,
                Err(error) => {
                    warn!("thumbnail loader poll failed: {error}");
                    break;
                }
            }
        }
    }

    fn track_state_change(&mut self) {
        if self.session.state() != &self.last_state {
            self.last_state = self.session.state().clone();
            self.state_changed_at = Instant::now();
            if self.last_state.is_loading() {
                self.thumbnails.clear();
            }
        }
        if self.session.preview_ticket().is_none() {
            self.preview_texture = None;
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        // A drop with zero files changes nothing; with several, the first
        // wins, matching the single-image contract.
        let Some(file) = dropped.into_iter().next() else {
            return;
        };

        let name = if !file.name.is_empty() {
            file.name.clone()
        } else if let Some(path) = &file.path {
            path.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "dropped-image".to_string())
        } else {
            "dropped-image".to_string()
        };

        let mime = if !file.mime.is_empty() {
            file.mime.clone()
        } else if let Some(format) = file.path.as_deref().and_then(ImageFormat::from_path) {
            format.mime_type().to_string()
        } else {
            // No declared type and no recognizable extension: ignore, like
            // any other unsupported candidate.
            return;
        };

        let bytes = if let Some(bytes) = &file.bytes {
            bytes.to_vec()
        } else if let Some(path) = &file.path {
            match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    self.push_toast(Notice::error(
                        "Could not read file",
                        format!("{}: {error}", path.display()),
                    ));
                    return;
                }
            }
        } else {
            return;
        };

        self.offer_candidate(&name, &mime, bytes);
    }

    fn offer_candidate(&mut self, name: &str, mime: &str, bytes: Vec<u8>) {
        match self.session.select_image(name, mime, bytes) {
            Ok(true) => {}
            Ok(false) => info!("ignored candidate {name} with unsupported type {mime}"),
            Err(error) => {
                self.push_toast(Notice::error("Could not load image", error.to_string()))
            }
        }
    }

    fn pick_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &PICKER_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        let Some(format) = ImageFormat::from_path(&path) else {
            return;
        };
        match std::fs::read(&path) {
            Ok(bytes) => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| "image".to_string());
                self.offer_candidate(&name, format.mime_type(), bytes);
            }
            Err(error) => self.push_toast(Notice::error(
                "Could not read file",
                format!("{}: {error}", path.display()),
            )),
        }
    }

    fn refresh_preview_texture(&mut self, ctx: &egui::Context) -> Option<egui::TextureHandle> {
        let ticket = self.session.preview_ticket()?;
        let stale = match &self.preview_texture {
            Some((held, _)) => *held != ticket,
            None => true,
        };
        if stale {
            let preview = self.session.preview_image()?;
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [preview.width as usize, preview.height as usize],
                &preview.rgba,
            );
            let handle = ctx.load_texture(
                format!("preview-{}", ticket.get()),
                image,
                egui::TextureOptions::LINEAR,
            );
            // Replacing the pair drops the previous texture with it.
            self.preview_texture = Some((ticket, handle));
        }
        self.preview_texture.as_ref().map(|(_, handle)| handle.clone())
    }

    fn draw_upload_zone(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let hovering_drop = ctx.input(|input| !input.raw.hovered_files.is_empty());
        let preview = self.refresh_preview_texture(ctx);
        let summary = self
            .session
            .selection()
            .map(|image| (image.name.clone(), image.byte_size()));

        let stroke = if hovering_drop {
            egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
        } else {
            ui.visuals().widgets.noninteractive.bg_stroke
        };

        egui::Frame::group(ui.style())
            .stroke(stroke)
            .inner_margin(egui::Margin::same(18))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.vertical_centered(|ui| match (preview, summary) {
                    (Some(texture), Some((name, byte_size))) => {
                        ui.add(
                            egui::Image::new(&texture)
                                .max_size(egui::vec2(PREVIEW_MAX_SIDE, PREVIEW_MAX_SIDE)),
                        );
                        ui.add_space(6.0);
                        ui.label(format!("{name} ({} KB)", byte_size.div_ceil(1024)));
                        ui.add_space(4.0);
                        ui.horizontal(|ui| {
                            ui.add_space(ui.available_width() / 2.0 - 80.0);
                            if ui.button("Replace…").clicked() {
                                self.pick_file();
                            }
                            if ui.button("Remove").clicked() {
                                self.session.clear_selection();
                            }
                        });
                    }
                    _ => {
                        ui.add_space(24.0);
                        ui.label(
                            egui::RichText::new(if hovering_drop {
                                "Drop the image to select it"
                            } else {
                                "Drag an image here"
                            })
                            .size(18.0),
                        );
                        ui.label(
                            egui::RichText::new("JPEG, PNG, WebP or GIF")
                                .color(ui.visuals().weak_text_color()),
                        );
                        ui.add_space(8.0);
                        if ui.button("Browse…").clicked() {
                            self.pick_file();
                        }
                        ui.add_space(24.0);
                    }
                });
            });
    }

    fn draw_search_controls(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.horizontal_top(|ui| {
                let label = if self.session.is_searching() {
                    "Searching…"
                } else {
                    "Search similar images"
                };
                let response =
                    ui.add_enabled(self.session.can_search(), egui::Button::new(label));
                if self.session.is_searching() {
                    ui.add(egui::Spinner::new());
                }
                if response.clicked() {
                    match self.session.trigger_search() {
                        Ok(Some(notice)) => self.push_toast(notice),
                        Ok(None) => {}
                        Err(error) => {
                            self.push_toast(Notice::error("Search failed", error.to_string()))
                        }
                    }
                }
            });
        });
    }

    fn draw_results(&mut self, ui: &mut egui::Ui) {
        match present_results(self.session.state()) {
            ResultsView::LoadingSlots(count) => draw_skeleton_grid(ui, count),
            ResultsView::Items(urls) => {
                for url in &urls {
                    if !self.thumbnails.contains_key(url) {
                        self.thumbnails.insert(url.clone(), ThumbSlot::Pending);
                        if let Err(error) =
                            self.loader.request(ResultImageRef::new(url.clone()))
                        {
                            warn!("could not request thumbnail: {error}");
                            self.thumbnails.insert(url.clone(), ThumbSlot::Failed);
                        }
                    }
                }
                let shown_for = self.state_changed_at.elapsed().as_secs_f32();
                ui.horizontal_wrapped(|ui| {
                    for (index, url) in urls.iter().enumerate() {
                        let alpha = fade_in_alpha(shown_for, index);
                        let slot = self.thumbnails.get(url);
                        draw_result_cell(ui, url, slot, alpha);
                    }
                });
            }
            ResultsView::Empty => {
                if self.session.has_searched() && !self.session.is_searching() {
                    ui.add_space(32.0);
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new("No similar images found").size(18.0));
                        ui.label(
                            egui::RichText::new("Try uploading a different image to find matches.")
                                .color(ui.visuals().weak_text_color()),
                        );
                    });
                } else {
                    ui.add_space(24.0);
                    ui.vertical_centered(|ui| {
                        ui.label(
                            egui::RichText::new("Upload an image to see similar results here.")
                                .color(ui.visuals().weak_text_color()),
                        );
                    });
                }
            }
        }
    }

    fn draw_toasts(&mut self, ctx: &egui::Context) {
        self.toasts
            .retain(|toast| toast.shown_at.elapsed() < TOAST_TTL);
        let mut dismissed: Option<usize> = None;
        for (index, toast) in self.toasts.iter().enumerate() {
            let offset = -16.0 - index as f32 * TOAST_STACK_STEP;
            egui::Area::new(egui::Id::new(("toast", index)))
                .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, offset))
                .order(egui::Order::Foreground)
                .show(ctx, |ui| {
                    let frame_response = egui::Frame::popup(ui.style())
                        .show(ui, |ui| {
                            ui.set_max_width(TOAST_WIDTH);
                            let title_color = match toast.notice.severity {
                                NoticeSeverity::Error => ui.visuals().error_fg_color,
                                NoticeSeverity::Info => ui.visuals().strong_text_color(),
                            };
                            ui.colored_label(
                                title_color,
                                egui::RichText::new(&toast.notice.title).strong(),
                            );
                            ui.label(&toast.notice.detail);
                        })
                        .response;
                    if frame_response
                        .interact(egui::Sense::click())
                        .clicked()
                    {
                        dismissed = Some(index);
                    }
                });
        }
        if let Some(index) = dismissed {
            self.toasts.remove(index);
        }
    }

    fn wants_repaint(&self) -> bool {
        let fading = self.state_changed_at.elapsed().as_secs_f32()
            < FADE_IN_SECS + FADE_STAGGER_SECS * 16.0;
        self.session.is_searching()
            || !self.toasts.is_empty()
            || fading
            || self
                .thumbnails
                .values()
                .any(|slot| matches!(slot, ThumbSlot::Pending))
    }
}

impl eframe::App for PixseekApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_session();
        self.drain_loader(ctx);
        self.track_state_change();
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.heading("pixseek");
            ui.label(
                egui::RichText::new("Find visually similar images")
                    .color(ui.visuals().weak_text_color()),
            );
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(10.0);
                self.draw_upload_zone(ctx, ui);
                ui.add_space(10.0);
                if self.session.selection().is_some() {
                    self.draw_search_controls(ui);
                    ui.add_space(10.0);
                }
                ui.separator();
                self.draw_results(ui);
            });
        });

        self.draw_toasts(ctx);

        if self.wants_repaint() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

fn fade_in_alpha(shown_for_secs: f32, index: usize) -> f32 {
    let start = index as f32 * FADE_STAGGER_SECS;
    ((shown_for_secs - start) / FADE_IN_SECS).clamp(0.0, 1.0)
}

fn draw_skeleton_grid(ui: &mut egui::Ui, count: usize) {
    let pulse = {
        let t = ui.input(|input| input.time);
        (((t * 2.0).sin() * 0.5 + 0.5) * 25.0) as u8 + 40
    };
    ui.horizontal_wrapped(|ui| {
        for _ in 0..count {
            let (rect, _) = ui.allocate_exact_size(
                egui::vec2(RESULT_CELL_SIDE, RESULT_CELL_SIDE),
                egui::Sense::hover(),
            );
            ui.painter().rect_filled(
                rect,
                egui::CornerRadius::same(8),
                egui::Color32::from_gray(pulse),
            );
        }
    });
}

fn draw_result_cell(ui: &mut egui::Ui, url: &str, slot: Option<&ThumbSlot>, alpha: f32) {
    ui.vertical(|ui| {
        ui.set_width(RESULT_CELL_SIDE);
        let tint = egui::Color32::WHITE.gamma_multiply(alpha);
        match slot {
            Some(ThumbSlot::Ready(texture)) => {
                ui.add(
                    egui::Image::new(texture)
                        .fit_to_exact_size(egui::vec2(RESULT_CELL_SIDE, RESULT_CELL_SIDE))
                        .tint(tint),
                );
            }
            Some(ThumbSlot::Pending) => {
                let (rect, _) = ui.allocate_exact_size(
                    egui::vec2(RESULT_CELL_SIDE, RESULT_CELL_SIDE),
                    egui::Sense::hover(),
                );
                ui.painter().rect_filled(
                    rect,
                    egui::CornerRadius::same(8),
                    egui::Color32::from_gray(45),
                );
                ui.put(rect, egui::Spinner::new());
            }
            // Fetch or decode failed: a placeholder glyph keeps the cell and
            // the rest of the grid intact.
            Some(ThumbSlot::Failed) | None => {
                let (rect, _) = ui.allocate_exact_size(
                    egui::vec2(RESULT_CELL_SIDE, RESULT_CELL_SIDE),
                    egui::Sense::hover(),
                );
                ui.painter().rect_filled(
                    rect,
                    egui::CornerRadius::same(8),
                    egui::Color32::from_gray(38),
                );
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "🖼",
                    egui::FontId::proportional(40.0),
                    egui::Color32::from_gray(110).gamma_multiply(alpha),
                );
            }
        }
        ui.hyperlink_to(
            egui::RichText::new("open").small(),
            url.to_string(),
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_staggers_by_index() {
        assert_eq!(fade_in_alpha(0.0, 0), 0.0);
        assert_eq!(fade_in_alpha(10.0, 0), 1.0);
        // A later cell is still invisible while the first is fading.
        assert!(fade_in_alpha(0.05, 4) < fade_in_alpha(0.05, 0));
        assert_eq!(fade_in_alpha(FADE_STAGGER_SECS * 4.0, 4), 0.0);
    }
}
