use std::{borrow::Cow, path::PathBuf};

use eframe::egui::{
    Button, CollapsingHeader, ColorImage, Grid, TextEdit, TextureHandle, TextureOptions, Ui,
    ViewportCommand,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigLoader, ConfigLoaderObject},
    workflow::{ProcessRequest, Render, Stage, Workflow},
};

use super::StateWorker;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

#[derive(Debug)]
pub(crate) enum Action {
    SelectedImage(PathBuf),
    Process,
    Stage(u64, Stage),
    Finished(u64, Render),
    Cancel,
    SavedConfig(eyre::Result<()>),
}

#[derive(Debug, Default)]
pub(crate) struct State {
    image_path: String,
    product_name: String,
    stage: Stage,
    result: Option<Render>,
    request_id: u64,
    running_token: Option<CancellationToken>,
    pub(crate) saved_config: SavedConfig,
}

impl State {
    pub(crate) fn is_busy(&self) -> bool {
        self.running_token.is_some()
    }

    /// If messages tagged with `request_id` belong to the running request.
    pub(crate) fn is_current(&self, request_id: u64) -> bool {
        self.is_busy() && request_id == self.request_id
    }

    fn request(&self) -> ProcessRequest {
        ProcessRequest {
            image_path: PathBuf::from(self.image_path.trim()),
            product_name: self.product_name.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SavedConfig {
    last_directory: Option<PathBuf>,
}

impl ConfigLoaderObject for SavedConfig {
    fn key(&self) -> Cow<'static, str> {
        "scan_form".into()
    }

    fn save(&self) -> eyre::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

pub(crate) struct ScanForm {
    pub(crate) worker: StateWorker<Action>,
    pub(crate) workflow: Workflow,
    pub(crate) config: ConfigLoader,
    pub(crate) config_path: Option<PathBuf>,
    thumbnail: Option<TextureHandle>,
}

impl ScanForm {
    pub(crate) fn new(
        worker: StateWorker<Action>,
        workflow: Workflow,
        config: ConfigLoader,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            worker,
            workflow,
            config,
            config_path,
            thumbnail: None,
        }
    }

    pub(crate) fn update(&mut self, state: &mut State, action: Action) {
        let worker = self.worker.clone();

        worker.apply(state, action, |state, action| match action {
            Action::SelectedImage(path) => {
                state.image_path = path.display().to_string();

                let last_directory = path.parent().map(ToOwned::to_owned);
                if last_directory != state.saved_config.last_directory {
                    state.saved_config.last_directory = last_directory;
                    self.save_config(&state.saved_config);
                }
            }
            Action::Process => {
                if state.is_busy() {
                    tracing::warn!("already processing, ignoring request");
                    return;
                }

                let request = state.request();
                let token = self.worker.child_token();
                state.request_id += 1;
                state.running_token = Some(token.clone());
                state.stage = Stage::Idle;
                state.result = None;
                self.thumbnail = None;

                let request_id = state.request_id;
                let workflow = self.workflow.clone();
                let stage_worker = self.worker.clone();
                self.worker.perform_cancellable(token, async move {
                    let render = workflow
                        .render(request, |stage| {
                            stage_worker.send(Action::Stage(request_id, stage))
                        })
                        .await;

                    Action::Finished(request_id, render)
                });
            }
            Action::Stage(request_id, stage) if state.is_current(request_id) => {
                state.stage = stage
            }
            Action::Stage(..) => (),
            Action::Finished(request_id, render) if state.is_current(request_id) => {
                state.running_token = None;
                state.stage = if render.record.is_some() {
                    Stage::Displaying
                } else {
                    Stage::Idle
                };
                state.result = Some(render);
            }
            Action::Finished(request_id, _) => {
                tracing::debug!(request_id, "discarding result of stale request")
            }
            Action::Cancel => {
                if let Some(token) = state.running_token.take() {
                    token.cancel();
                    state.stage = Stage::Idle;
                    state.result = Some(Render::message("Lookup cancelled."));
                }
            }
            Action::SavedConfig(Ok(())) => (),
            Action::SavedConfig(Err(err)) => tracing::error!("could not write config: {err}"),
        });
    }

    fn save_config(&self, saved_config: &SavedConfig) {
        let Some(path) = &self.config_path else {
            tracing::debug!("no config location, keeping form config in memory");
            return;
        };

        match self.config.persist(saved_config, path) {
            Ok(fut) => self
                .worker
                .perform(async move { Action::SavedConfig(fut.await) }),
            Err(err) => tracing::error!("could not save form config: {err}"),
        }
    }

    pub(crate) fn render(&mut self, state: &mut State, ui: &mut Ui) {
        ui.add_enabled_ui(!state.is_busy(), |ui| {
            Grid::new("scan_form")
                .num_columns(3)
                .spacing([12.0, 8.0])
                .show(ui, |ui| {
                    self.form_grid(state, ui);
                });
        });

        ui.add_space(8.0);

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!state.is_busy(), Button::new("Process"))
                .clicked()
            {
                self.worker.send(Action::Process);
            }

            if state.is_busy() {
                if ui.button("Cancel").clicked() {
                    self.worker.send(Action::Cancel);
                }

                ui.spinner();
                ui.label(state.stage.to_string());
            } else if state.stage == Stage::Displaying {
                ui.label(state.stage.to_string());
            }

            if ui.button("Quit").clicked() {
                ui.ctx().send_viewport_cmd(ViewportCommand::Close);
            }
        });

        ui.separator();

        if let Some(result) = &state.result {
            self.result_view(result, ui);
        }
    }

    fn form_grid(&self, state: &mut State, ui: &mut Ui) {
        ui.label("Select Image:");
        ui.add(
            TextEdit::singleline(&mut state.image_path)
                .hint_text("Path to an image with a barcode")
                .desired_width(360.0),
        );
        if ui.button("Browse").clicked() {
            let mut dialog = rfd::FileDialog::new().add_filter("Images", IMAGE_EXTENSIONS);
            if let Some(dir) = &state.saved_config.last_directory {
                dialog = dialog.set_directory(dir);
            }

            if let Some(path) = dialog.pick_file() {
                self.worker.send(Action::SelectedImage(path));
            }
        }
        ui.end_row();

        ui.label("Product Name:");
        ui.add(TextEdit::singleline(&mut state.product_name).desired_width(360.0));
        ui.end_row();
    }

    fn result_view(&mut self, result: &Render, ui: &mut Ui) {
        ui.label(result.text.as_str());

        if let Some(image) = &result.thumbnail {
            let texture = self.thumbnail.get_or_insert_with(|| {
                let size = [image.width() as usize, image.height() as usize];
                ui.ctx().load_texture(
                    "scan-thumbnail",
                    ColorImage::from_rgba_unmultiplied(size, image.as_raw()),
                    TextureOptions::LINEAR,
                )
            });

            ui.add_space(8.0);
            ui.image((texture.id(), texture.size_vec2()));
        }

        if let Some(nutriments) = result
            .record
            .as_ref()
            .and_then(|record| record.nutriments.as_ref())
        {
            CollapsingHeader::new("Raw Data").show(ui, |ui| {
                let theme = egui_extras::syntax_highlighting::CodeTheme::from_memory(ui.ctx());
                let json = serde_json::to_string_pretty(nutriments)
                    .unwrap_or_else(|_| nutriments.to_string());
                egui_extras::syntax_highlighting::code_view_ui(ui, &theme, &json, "json");
            });
        }
    }
}

#[cfg(test)]
impl State {
    /// A form waiting on the request tagged `request_id`.
    pub(crate) fn running(request_id: u64) -> Self {
        Self {
            request_id,
            running_token: Some(CancellationToken::new()),
            ..Default::default()
        }
    }
}
