use std::num::NonZeroUsize;
use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use eframe::egui::{self, Grid, ViewportBuilder};
use eframe::{
    egui::{menu, pos2, vec2, CentralPanel, Rect, SidePanel, TopBottomPanel, Window},
    run_native, App, NativeOptions,
};
use ring_channel::ring_channel;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    barcode::RxingReader,
    config::{self, ConfigLoader},
    nutrition::{LookupSettings, NutritionRecord, OpenFoodFacts},
    workflow::{Render, Workflow},
};

use self::state_worker::StateWorker;

mod lookup_settings;
mod scan_form;
mod state_worker;

const HISTORY_LENGTH: usize = 100;

#[derive(Debug)]
struct HistoryEntry {
    id: Uuid,
    barcode: String,
    product_name: String,
    details: String,
}

impl From<&NutritionRecord> for HistoryEntry {
    fn from(record: &NutritionRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            barcode: record.barcode.clone(),
            product_name: record.product_name.clone(),
            details: record.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    lookup_settings_open: bool,
    lookup_settings: lookup_settings::State,
    scan_form: scan_form::State,
    history: VecDeque<HistoryEntry>,
}

impl State {
    /// Adds the record from a lookup that finishes the running request.
    fn record_history(&mut self, action: &scan_form::Action) {
        let scan_form::Action::Finished(
            request_id,
            Render {
                record: Some(record),
                ..
            },
        ) = action
        else {
            return;
        };

        if self.scan_form.is_current(*request_id) {
            self.history.push_front(record.into());
            self.history.truncate(HISTORY_LENGTH);
        }
    }
}

#[derive(Debug)]
enum Action {
    ScanForm(scan_form::Action),
    LookupSettings(lookup_settings::Action),
}

struct Application {
    state: State,
    // We need to keep this handle so the worker doesn't get cancelled.
    #[allow(dead_code)]
    worker: StateWorker<Action>,

    rx: ring_channel::RingReceiver<Action>,

    scan_form: scan_form::ScanForm,
    lookup_settings: lookup_settings::LookupSettingsWindow,
}

impl Application {
    fn new(
        cc: &eframe::CreationContext,
        state: State,
        rx: ring_channel::RingReceiver<Action>,
        mut worker: StateWorker<Action>,
        workflow: Workflow,
        config: ConfigLoader,
        config_path: Option<PathBuf>,
    ) -> Self {
        worker.set_egui_ctx(cc.egui_ctx.clone());

        Application {
            state,
            rx,
            scan_form: scan_form::ScanForm::new(
                worker.scoped(Action::ScanForm),
                workflow,
                config.clone(),
                config_path.clone(),
            ),
            lookup_settings: lookup_settings::LookupSettingsWindow {
                worker: worker.scoped(Action::LookupSettings),
                config,
                config_path,
            },
            worker,
        }
    }

    fn apply(&mut self, action: Action) {
        tracing::debug!(?action, "got action");

        match action {
            Action::ScanForm(scan_form) => {
                self.state.record_history(&scan_form);
                self.scan_form
                    .update(&mut self.state.scan_form, scan_form);
            }
            Action::LookupSettings(lookup_settings) => {
                if let Some(client) = self
                    .lookup_settings
                    .update(&mut self.state.lookup_settings, lookup_settings)
                {
                    tracing::info!("using updated lookup service");
                    self.scan_form.workflow = self.scan_form.workflow.with_lookup(Arc::new(client));
                }
            }
        }
    }
}

impl App for Application {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(action) = self.rx.try_recv() {
            self.apply(action);
        }

        let dropped = ctx.input(|input| {
            input
                .raw
                .dropped_files
                .iter()
                .find_map(|file| file.path.clone())
        });
        if let Some(path) = dropped {
            if !self.state.scan_form.is_busy() {
                self.scan_form
                    .worker
                    .send(scan_form::Action::SelectedImage(path));
            }
        }

        Window::new("Lookup Service")
            .open(&mut self.state.lookup_settings_open)
            .resizable(false)
            .default_rect(Rect::from_min_size(pos2(10.0, 80.0), vec2(320.0, 160.0)))
            .show(ctx, |ui| {
                self.lookup_settings
                    .render(&mut self.state.lookup_settings, ui)
            });

        TopBottomPanel::top("top_panel").show(ctx, |ui| {
            menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Settings", |ui| {
                    if ui.button("Lookup Service").clicked() {
                        self.state.lookup_settings_open = true;
                        ui.close_menu();
                    }
                });
            });
        });

        SidePanel::right("right_panel")
            .min_width(180.0)
            .show(ctx, |ui| {
                ui.heading("Scan History");

                Grid::new("scan_history")
                    .striped(true)
                    .num_columns(2)
                    .spacing([20.0, 4.0])
                    .show(ui, |ui| {
                        for entry in self.state.history.iter() {
                            ui.push_id(entry.id, |ui| {
                                ui.label(entry.barcode.as_str())
                                    .on_hover_text(entry.details.as_str());
                            });
                            ui.label(entry.product_name.as_str());
                            ui.end_row();
                        }
                    });
            });

        CentralPanel::default().show(ctx, |ui| {
            ui.heading("Grocery Item Scanner");
            ui.add_space(8.0);

            self.scan_form.render(&mut self.state.scan_form, ui);
        });
    }
}

pub(crate) fn show_ui() -> eyre::Result<()> {
    let (tx, rx) = ring_channel::<Action>(NonZeroUsize::new(64).unwrap());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let (config, config_path) = rt.block_on(ConfigLoader::open(config::default_path()));

    let mut state = State::default();

    let mut settings = LookupSettings::default();
    if let Err(err) = config.restore_object(&mut settings) {
        tracing::warn!("could not restore lookup settings: {err}");
    }

    let client = match OpenFoodFacts::new(&settings) {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!("saved lookup settings were invalid, using defaults: {err}");
            settings = LookupSettings::default();
            OpenFoodFacts::new(&settings)?
        }
    };
    state.lookup_settings = lookup_settings::State::new(settings);

    if let Err(err) = config.restore_object(&mut state.scan_form.saved_config) {
        tracing::warn!("could not restore form config: {err}");
    }

    let workflow = Workflow::new(Arc::new(RxingReader), Arc::new(client));

    let token = CancellationToken::new();
    let worker = StateWorker::new(rt.handle().clone(), tx, token);

    let options = NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([760.0, 560.0])
            .with_min_inner_size([520.0, 360.0]),
        ..Default::default()
    };

    run_native(
        "Grocery Item Scanner",
        options,
        Box::new(move |cc| {
            Box::new(Application::new(
                cc,
                state,
                rx,
                worker,
                workflow,
                config,
                config_path,
            ))
        }),
    )
    .map_err(|err| eyre::eyre!("egui error: {err}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::nutrition::Nutrient;

    use super::*;

    fn finished(request_id: u64, barcode: &str) -> scan_form::Action {
        let record = NutritionRecord {
            product_name: "Apple".to_string(),
            barcode: barcode.to_string(),
            proteins: Nutrient::NotAvailable,
            calories: Nutrient::NotAvailable,
            sugar: Nutrient::NotAvailable,
            nutriments: None,
        };

        scan_form::Action::Finished(
            request_id,
            Render {
                text: record.to_string(),
                thumbnail: None,
                record: Some(record),
            },
        )
    }

    #[test]
    fn only_running_lookups_are_recorded() {
        let mut state = State::default();
        state.record_history(&finished(1, "111"));
        assert!(state.history.is_empty());

        state.scan_form = scan_form::State::running(3);
        state.record_history(&finished(2, "222"));
        state.record_history(&scan_form::Action::Finished(
            3,
            Render::message("No barcode detected in the image."),
        ));
        assert!(state.history.is_empty());

        state.record_history(&finished(3, "333"));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].barcode, "333");
        assert_eq!(state.history[0].product_name, "Apple");
    }

    #[test]
    fn history_keeps_latest_entries() {
        let mut state = State {
            scan_form: scan_form::State::running(1),
            ..Default::default()
        };

        for n in 0..(HISTORY_LENGTH + 20) {
            state.record_history(&finished(1, &n.to_string()));
        }

        assert_eq!(state.history.len(), HISTORY_LENGTH);
        assert_eq!(
            state.history.front().unwrap().barcode,
            (HISTORY_LENGTH + 19).to_string()
        );
        assert_eq!(state.history.back().unwrap().barcode, "20");
    }
}
