//! CyberScape viewer
//! Desktop window that runs the engine into an offscreen surface and shows it

use cyberscape::{CyberScape, FrameInput, SimulationConfig, Surface};
use anyhow::Context;
use eframe::egui;
use std::path::{Path, PathBuf};
use std::time::Instant;

struct ViewerApp {
    engine: CyberScape,
    surface: Surface,
    texture: Option<egui::TextureHandle>,
    started: Instant,
    show_stats: bool,
}

impl ViewerApp {
    fn new(cc: &eframe::CreationContext<'_>, config: SimulationConfig) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.panel_fill = egui::Color32::from_rgb(6, 4, 14);
        cc.egui_ctx.set_visuals(visuals);

        Self {
            engine: CyberScape::new(1280.0, 720.0, config),
            surface: Surface::new(1280, 720),
            texture: None,
            started: Instant::now(),
            show_stats: false,
        }
    }

    fn upload(&mut self, ctx: &egui::Context) {
        let image = self.surface.image();
        let size = [image.width() as usize, image.height() as usize];
        let frame = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(frame, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("cyberscape", frame, egui::TextureOptions::LINEAR));
            }
        }
    }

    fn render_stats(&self, ctx: &egui::Context) {
        let stats = self.engine.stats();
        egui::TopBottomPanel::top("stats").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("frame {}", stats.frames));
                ui.separator();
                ui.label(format!("particles {}", stats.particles));
                ui.label(format!("links {}", stats.connections));
                ui.label(format!("shapes {} ({} exploded)", stats.shapes, stats.exploded_shapes));
                ui.separator();
                ui.label(format!("bursts {}", stats.explosion_particles + stats.datastream_particles));
                ui.label(format!("level {:.1}", stats.performance_level));
            });
        });
    }

    fn render_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click());

                if response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        let local = pos - rect.min;
                        self.engine.trigger_special_animation(local.x, local.y);
                    }
                }

                let pointer = response.hover_pos().map(|p| {
                    let local = p - rect.min;
                    glam::Vec2::new(local.x, local.y)
                });
                let input = FrameInput {
                    width: rect.width().round(),
                    height: rect.height().round(),
                    pointer,
                    pointer_over: pointer.is_some(),
                };

                let now_ms = self.started.elapsed().as_secs_f64() * 1000.0;
                if self.engine.render_frame(now_ms, &input, &mut self.surface) || self.texture.is_none() {
                    self.upload(ctx);
                }

                if let Some(texture) = &self.texture {
                    let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                    ui.painter_at(rect).image(texture.id(), rect, uv, egui::Color32::WHITE);
                }
            });
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::F1)) {
            self.show_stats = !self.show_stats;
        }
        if self.show_stats {
            self.render_stats(ctx);
        }
        self.render_canvas(ctx);

        ctx.request_repaint();
    }
}

impl Drop for ViewerApp {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn load_config(path: &Path) -> anyhow::Result<SimulationConfig> {
    let config = SimulationConfig::load(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

fn main() -> eframe::Result<()> {
    env_logger::init();

    let config = match config_path() {
        Some(path) => load_config(&path).unwrap_or_else(|e| {
            log::error!("{:#}", e);
            SimulationConfig::default()
        }),
        None => SimulationConfig::default(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("CyberScape")
            .with_min_inner_size([320.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        "CyberScape",
        options,
        Box::new(|cc| Box::new(ViewerApp::new(cc, config))),
    )
}
