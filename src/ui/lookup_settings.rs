use std::path::PathBuf;

use eframe::egui::{Color32, DragValue, Grid, TextEdit, Ui};

use crate::{
    config::ConfigLoader,
    nutrition::{LookupSettings, OpenFoodFacts},
};

use super::StateWorker;

#[derive(Debug)]
pub(crate) enum Action {
    Save,
    ResetDefaults,
    Saved(eyre::Result<()>),
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) saved: LookupSettings,
    editing: LookupSettings,
    error: Option<String>,
}

impl State {
    pub(crate) fn new(saved: LookupSettings) -> Self {
        Self {
            editing: saved.clone(),
            saved,
            error: None,
        }
    }

    fn has_changes(&self) -> bool {
        self.editing != self.saved
    }
}

pub(crate) struct LookupSettingsWindow {
    pub(crate) worker: StateWorker<Action>,
    pub(crate) config: ConfigLoader,
    pub(crate) config_path: Option<PathBuf>,
}

impl LookupSettingsWindow {
    /// Applies an action, returning a new client when the settings changed.
    pub(crate) fn update(&self, state: &mut State, action: Action) -> Option<OpenFoodFacts> {
        let mut client = None;

        self.worker
            .apply(state, action, |state, action| match action {
                Action::Save => match OpenFoodFacts::new(&state.editing) {
                    Ok(off) => {
                        state.error = None;
                        state.saved = state.editing.clone();
                        client = Some(off);

                        let Some(path) = &self.config_path else {
                            tracing::debug!("no config location, keeping lookup settings in memory");
                            return;
                        };

                        match self.config.persist(&state.saved, path) {
                            Ok(fut) => self.worker.perform(async move { Action::Saved(fut.await) }),
                            Err(err) => state.error = Some(err.to_string()),
                        }
                    }
                    Err(err) => {
                        tracing::warn!("invalid lookup settings: {err}");
                        state.error = Some(err.to_string());
                    }
                },
                Action::ResetDefaults => {
                    state.editing = LookupSettings::default();
                    state.error = None;
                }
                Action::Saved(Ok(())) => tracing::info!("saved lookup settings"),
                Action::Saved(Err(err)) => {
                    tracing::error!("could not write lookup settings: {err}");
                    state.error = Some(format!("Could not save settings: {err}"));
                }
            });

        client
    }

    pub(crate) fn render(&mut self, state: &mut State, ui: &mut Ui) {
        Grid::new("lookup_settings")
            .num_columns(2)
            .spacing([40.0, 4.0])
            .show(ui, |ui| {
                ui.label("Service URL");
                ui.add(TextEdit::singleline(&mut state.editing.base_url).desired_width(240.0));
                ui.end_row();

                ui.label("Timeout");
                ui.add(
                    DragValue::new(&mut state.editing.timeout_secs)
                        .clamp_range(1..=120)
                        .suffix(" s"),
                );
                ui.end_row();
            });

        if let Some(error) = &state.error {
            ui.colored_label(Color32::RED, error.as_str());
        }

        ui.separator();

        ui.horizontal(|ui| {
            ui.add_enabled_ui(state.has_changes(), |ui| {
                if ui.button("Save").clicked() {
                    self.worker.send(Action::Save);
                }
            });

            if ui.button("Reset to defaults").clicked() {
                self.worker.send(Action::ResetDefaults);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ring_channel::ring_channel;
    use tokio_util::sync::CancellationToken;

    use super::*;

    #[test]
    fn save_without_config_location_still_applies() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (tx, mut rx) = ring_channel(NonZeroUsize::new(4).unwrap());
        let window = LookupSettingsWindow {
            worker: StateWorker::new(rt.handle().clone(), tx, CancellationToken::new()),
            config: ConfigLoader::default(),
            config_path: None,
        };

        let mut state = State::new(LookupSettings::default());
        state.editing.base_url = "http://localhost:8080".to_string();

        let client = window.update(&mut state, Action::Save);

        assert!(client.is_some());
        assert!(state.error.is_none());
        assert!(!state.has_changes());
        assert_eq!(state.saved.base_url, "http://localhost:8080");
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_settings_are_not_saved() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (tx, _rx) = ring_channel(NonZeroUsize::new(4).unwrap());
        let window = LookupSettingsWindow {
            worker: StateWorker::new(rt.handle().clone(), tx, CancellationToken::new()),
            config: ConfigLoader::default(),
            config_path: None,
        };

        let mut state = State::new(LookupSettings::default());
        state.editing.base_url = "ftp://example.com".to_string();

        assert!(window.update(&mut state, Action::Save).is_none());
        assert!(state.error.is_some());
        assert!(state.has_changes());
    }

    #[test]
    fn tracks_unsaved_changes() {
        let mut state = State::new(LookupSettings::default());
        assert!(!state.has_changes());

        state.editing.timeout_secs = 30;
        assert!(state.has_changes());
    }
}
