//! Loss and perplexity figures.
//!
//! Four families of figures are produced from the retrieved histories:
//! 1. per experiment, its smoothed loss and perplexity side by side;
//! 2. the same two panels with every experiment overlaid;
//! 3. per experiment, all of its loss series overlaid;
//! 4. per loss type (other than the total loss), that loss across experiments.
//!
//! Each curve is drawn as its per-epoch mean with a translucent ± one standard
//! deviation band, on a logarithmic y axis.

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use trainlab_core::PlotConfig;

use crate::checkpoint::{LossSeries, RetrievedLosses, TOTAL_LOSS};
use crate::colormap::{Colormap, Rgb};
use crate::curves::{Band, EpochMatrix, check_same_epochs, check_same_length};
use crate::error::MlError;
use crate::smoothing::Smoother;

const WIDE_FIGURE: (u32, u32) = (1600, 800);
const SQUARE_FIGURE: (u32, u32) = (800, 800);
const MERGED_LOSS_AND_PERPLEXITY: &str = "merged-loss-and-perplexity";

/// Losses of one experiment, along with where its figures go.
#[derive(Debug, Clone)]
pub struct PlotInput {
    pub name: String,
    pub results_path: PathBuf,
    pub losses: RetrievedLosses,
}

/// Smoothed curves of one experiment.
struct Smoothed<'a> {
    name: &'a str,
    results_path: &'a Path,
    latest_epoch: usize,
    losses: Vec<LossSeries>,
    perplexities: Vec<f64>,
}

impl Smoothed<'_> {
    fn loss(&self, name: &str) -> Option<&[f64]> {
        self.losses
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.values.as_slice())
    }

    fn total_loss(&self) -> Result<&[f64], MlError> {
        self.loss(TOTAL_LOSS).ok_or_else(|| {
            MlError::not_found(format!(
                "experiment '{}' has no '{TOTAL_LOSS}' series",
                self.name
            ))
        })
    }
}

struct Curve<'a> {
    label: &'a str,
    color: Rgb,
    band: Band,
}

struct Panel<'a> {
    title: String,
    y_label: &'a str,
    curves: Vec<Curve<'a>>,
    legend: bool,
}

/// Renders the loss figures of a set of experiments.
#[derive(Debug, Clone, Copy)]
pub struct LossPlotter {
    smoother: Smoother,
    colormap: Colormap,
    loss_types_colormap: Colormap,
}

impl LossPlotter {
    pub fn new(smoother: Smoother, colormap: Colormap, loss_types_colormap: Colormap) -> Self {
        Self {
            smoother,
            colormap,
            loss_types_colormap,
        }
    }

    pub fn from_config(config: &PlotConfig) -> Result<Self, MlError> {
        Ok(Self::new(
            Smoother::from(config),
            Colormap::from_name(&config.colormap)?,
            Colormap::from_name(&config.loss_types_colormap)?,
        ))
    }

    /// Draw every figure and return the written paths.
    pub fn plot_all(&self, inputs: &[PlotInput]) -> Result<Vec<PathBuf>, MlError> {
        if inputs.is_empty() {
            warn!("No experiment losses to plot");
            return Ok(Vec::new());
        }

        let smoothed = inputs
            .iter()
            .map(|input| self.smooth(input))
            .collect::<Result<Vec<_>, _>>()?;
        let colors = self.colormap.colors(smoothed.len());

        let mut saved = self.plot_loss_and_perplexity_figures(&smoothed, &colors)?;
        saved.push(self.plot_merged_loss_and_perplexity(&smoothed, &colors)?);
        saved.extend(self.plot_merged_all_losses(&smoothed)?);
        saved.extend(self.plot_merged_loss_types(&smoothed)?);
        Ok(saved)
    }

    fn smooth<'a>(&self, input: &'a PlotInput) -> Result<Smoothed<'a>, MlError> {
        let losses = input
            .losses
            .history
            .losses
            .iter()
            .map(|series| {
                Ok(LossSeries {
                    name: series.name.clone(),
                    values: self.smoother.smooth(&series.values)?,
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;
        Ok(Smoothed {
            name: &input.name,
            results_path: &input.results_path,
            latest_epoch: input.losses.latest_epoch,
            losses,
            perplexities: self.smoother.smooth(&input.losses.history.perplexities)?,
        })
    }

    /// One loss + perplexity figure per experiment.
    fn plot_loss_and_perplexity_figures(
        &self,
        experiments: &[Smoothed<'_>],
        colors: &[Rgb],
    ) -> Result<Vec<PathBuf>, MlError> {
        let mut saved = Vec::with_capacity(experiments.len());
        for (experiment, &color) in experiments.iter().zip(colors) {
            let epochs = experiment.latest_epoch;
            let loss = band_of(experiment.total_loss()?, epochs)?;
            let perplexity = band_of(&experiment.perplexities, epochs)?;

            let path = experiment
                .results_path
                .join(format!("{}_loss-and-perplexity.svg", experiment.name));
            let panels = [
                loss_panel(
                    vec![Curve {
                        label: experiment.name,
                        color,
                        band: loss,
                    }],
                    false,
                ),
                perplexity_panel(
                    vec![Curve {
                        label: experiment.name,
                        color,
                        band: perplexity,
                    }],
                    false,
                ),
            ];
            draw_figure(&path, WIDE_FIGURE, &panels)?;
            saved.push(path);
        }
        Ok(saved)
    }

    /// Every experiment's loss and perplexity on one figure.
    fn plot_merged_loss_and_perplexity(
        &self,
        experiments: &[Smoothed<'_>],
        colors: &[Rgb],
    ) -> Result<PathBuf, MlError> {
        let epochs = check_same_epochs(&latest_epochs(experiments))?;

        let losses = experiments
            .iter()
            .map(|e| e.total_loss())
            .collect::<Result<Vec<_>, _>>()?;
        check_same_length(&losses)?;
        let perplexities: Vec<&[f64]> =
            experiments.iter().map(|e| e.perplexities.as_slice()).collect();
        check_same_length(&perplexities)?;

        let mut loss_curves = Vec::with_capacity(experiments.len());
        let mut perplexity_curves = Vec::with_capacity(experiments.len());
        for (i, experiment) in experiments.iter().enumerate() {
            loss_curves.push(Curve {
                label: experiment.name,
                color: colors[i],
                band: band_of(losses[i], epochs)?,
            });
            perplexity_curves.push(Curve {
                label: experiment.name,
                color: colors[i],
                band: band_of(perplexities[i], epochs)?,
            });
        }

        let path = experiments[0]
            .results_path
            .join(format!("{MERGED_LOSS_AND_PERPLEXITY}.svg"));
        let panels = [
            loss_panel(loss_curves, true),
            perplexity_panel(perplexity_curves, true),
        ];
        draw_figure(&path, WIDE_FIGURE, &panels)?;
        Ok(path)
    }

    /// For each experiment, all of its loss series on one figure.
    ///
    /// Each figure is written to that experiment's own results path, not to
    /// the results path of the first experiment.
    fn plot_merged_all_losses(&self, experiments: &[Smoothed<'_>]) -> Result<Vec<PathBuf>, MlError> {
        let epochs = check_same_epochs(&latest_epochs(experiments))?;

        let mut saved = Vec::with_capacity(experiments.len());
        for experiment in experiments {
            check_same_length(
                &experiment
                    .losses
                    .iter()
                    .map(|s| s.values.as_slice())
                    .collect::<Vec<_>>(),
            )?;
            let colors = self.loss_types_colormap.colors(experiment.losses.len());
            let curves = experiment
                .losses
                .iter()
                .zip(colors)
                .map(|(series, color)| {
                    Ok(Curve {
                        label: &series.name,
                        color,
                        band: band_of(&series.values, epochs)?,
                    })
                })
                .collect::<Result<Vec<_>, MlError>>()?;

            let path = experiment
                .results_path
                .join(format!("{}_merged-losses.svg", experiment.name));
            let panel = Panel {
                title: format!("Smoothed losses of {}", experiment.name),
                y_label: "Loss",
                curves,
                legend: true,
            };
            draw_figure(&path, SQUARE_FIGURE, &[panel])?;
            saved.push(path);
        }
        Ok(saved)
    }

    /// For each loss type other than the total, that loss across experiments.
    fn plot_merged_loss_types(&self, experiments: &[Smoothed<'_>]) -> Result<Vec<PathBuf>, MlError> {
        let epochs = check_same_epochs(&latest_epochs(experiments))?;

        // Loss types in order of first appearance, each with the experiments that log it.
        let mut by_type: Vec<(&str, Vec<(&str, &[f64])>)> = Vec::new();
        for experiment in experiments {
            for series in experiment.losses.iter().filter(|s| s.name != TOTAL_LOSS) {
                let entry = (experiment.name, series.values.as_slice());
                match by_type.iter_mut().find(|(name, _)| *name == series.name) {
                    Some((_, curves)) => curves.push(entry),
                    None => by_type.push((series.name.as_str(), vec![entry])),
                }
            }
        }

        let results_path = experiments[0].results_path;
        let mut saved = Vec::with_capacity(by_type.len());
        for (loss_name, entries) in by_type {
            check_same_length(&entries.iter().map(|(_, v)| *v).collect::<Vec<_>>())?;
            let colors = self.loss_types_colormap.colors(entries.len());
            let curves = entries
                .into_iter()
                .zip(colors)
                .map(|((label, values), color)| {
                    Ok(Curve {
                        label,
                        color,
                        band: band_of(values, epochs)?,
                    })
                })
                .collect::<Result<Vec<_>, MlError>>()?;

            let path = results_path.join(format!("{loss_name}.svg"));
            let panel = Panel {
                title: format!("Smoothed {}", loss_name.replace('_', " ")),
                y_label: "Loss",
                curves,
                legend: true,
            };
            draw_figure(&path, SQUARE_FIGURE, &[panel])?;
            saved.push(path);
        }
        Ok(saved)
    }
}

fn latest_epochs(experiments: &[Smoothed<'_>]) -> Vec<usize> {
    experiments.iter().map(|e| e.latest_epoch).collect()
}

fn band_of(values: &[f64], epochs: usize) -> Result<Band, MlError> {
    Ok(EpochMatrix::from_series(values.to_vec(), epochs)?.band())
}

fn loss_panel(curves: Vec<Curve<'_>>, legend: bool) -> Panel<'_> {
    Panel {
        title: "Smoothed loss".to_string(),
        y_label: "Loss",
        curves,
        legend,
    }
}

fn perplexity_panel(curves: Vec<Curve<'_>>, legend: bool) -> Panel<'_> {
    Panel {
        title: "Smoothed average codebook usage".to_string(),
        y_label: "Perplexity",
        curves,
        legend,
    }
}

fn plot_error(err: impl std::fmt::Display) -> MlError {
    MlError::plot(err.to_string())
}

/// Render `panels` side by side and write the SVG atomically to `path`.
fn draw_figure(path: &Path, size: (u32, u32), panels: &[Panel<'_>]) -> Result<(), MlError> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;
        let areas = root.split_evenly((1, panels.len().max(1)));
        for (area, panel) in areas.iter().zip(panels) {
            draw_panel(area, panel)?;
        }
        root.present().map_err(plot_error)?;
    }

    trainlab_core::persistence::atomic_write(path, svg.as_bytes())?;
    info!(path = %path.display(), "Saved figure");
    Ok(())
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &Panel<'_>) -> Result<(), MlError> {
    let epochs = panel.curves.iter().map(|c| c.band.len()).max().unwrap_or(0);
    let x_max = epochs.saturating_sub(1).max(1) as f64;

    let (y_min, y_max) = panel
        .curves
        .iter()
        .filter_map(|c| c.band.positive_extent())
        .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
        .unwrap_or((0.1, 1.0));
    let floor = y_min * 0.9;
    let ceiling = y_max * 1.1;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 22))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(64)
        .build_cartesian_2d(0f64..x_max, (floor..ceiling).log_scale())
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Epochs")
        .y_desc(panel.y_label)
        .bold_line_style(BLACK.mix(0.15))
        .light_line_style(TRANSPARENT)
        .draw()
        .map_err(plot_error)?;

    let clamp = |v: f64| v.max(floor).min(ceiling);

    for curve in &panel.curves {
        let color = RGBColor(curve.color.r, curve.color.g, curve.color.b);

        let mut outline: Vec<(f64, f64)> = curve
            .band
            .upper()
            .into_iter()
            .enumerate()
            .map(|(t, v)| (t as f64, clamp(v)))
            .collect();
        outline.extend(
            curve
                .band
                .lower()
                .into_iter()
                .enumerate()
                .rev()
                .map(|(t, v)| (t as f64, clamp(v))),
        );
        chart
            .draw_series(std::iter::once(Polygon::new(outline, color.mix(0.5).filled())))
            .map_err(plot_error)?;

        let line = chart
            .draw_series(LineSeries::new(
                curve
                    .band
                    .mean
                    .iter()
                    .enumerate()
                    .map(|(t, &v)| (t as f64, clamp(v))),
                color.stroke_width(2),
            ))
            .map_err(plot_error)?;

        if panel.legend {
            line.label(curve.label).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
        }
    }

    if panel.legend && !panel.curves.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::LossHistory;
    use tempfile::TempDir;

    fn input(name: &str, results_path: &Path, epochs: usize, per_epoch: usize) -> PlotInput {
        let n = epochs * per_epoch;
        let decay = |scale: f64| -> Vec<f64> {
            (0..n).map(|i| scale * (1.0 + 4.0 / (1.0 + i as f64))).collect()
        };
        PlotInput {
            name: name.to_string(),
            results_path: results_path.to_path_buf(),
            losses: RetrievedLosses {
                history: LossHistory {
                    losses: vec![
                        LossSeries {
                            name: "loss".into(),
                            values: decay(1.0),
                        },
                        LossSeries {
                            name: "vq_loss".into(),
                            values: decay(0.3),
                        },
                    ],
                    perplexities: decay(20.0),
                },
                latest_epoch: epochs,
            },
        }
    }

    #[test]
    fn test_plot_all_writes_every_family() {
        let dir = TempDir::new().unwrap();
        let plotter = LossPlotter::from_config(&PlotConfig::default()).unwrap();
        let inputs = vec![
            input("baseline", dir.path(), 3, 20),
            input("jitter", dir.path(), 3, 20),
        ];

        let saved = plotter.plot_all(&inputs).unwrap();
        let names: Vec<String> = saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "baseline_loss-and-perplexity.svg",
                "jitter_loss-and-perplexity.svg",
                "merged-loss-and-perplexity.svg",
                "baseline_merged-losses.svg",
                "jitter_merged-losses.svg",
                "vq_loss.svg",
            ]
        );
        for path in &saved {
            let svg = std::fs::read_to_string(path).unwrap();
            assert!(svg.contains("<svg"), "{} is not an svg", path.display());
        }
        let merged = std::fs::read_to_string(dir.path().join("vq_loss.svg")).unwrap();
        assert!(merged.contains("Smoothed vq loss"));
    }

    #[test]
    fn test_merged_losses_go_to_each_results_path() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let plotter = LossPlotter::from_config(&PlotConfig::default()).unwrap();
        let inputs = vec![input("baseline", &first, 3, 20), input("jitter", &second, 3, 20)];

        plotter.plot_all(&inputs).unwrap();

        assert!(first.join("baseline_merged-losses.svg").exists());
        assert!(second.join("jitter_merged-losses.svg").exists());
        assert!(!first.join("jitter_merged-losses.svg").exists());
        // Cross-experiment figures stay with the first experiment.
        assert!(first.join("merged-loss-and-perplexity.svg").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&first)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_merging_requires_equal_epochs() {
        let dir = TempDir::new().unwrap();
        let plotter = LossPlotter::from_config(&PlotConfig::default()).unwrap();
        let inputs = vec![
            input("baseline", dir.path(), 3, 20),
            input("longer", dir.path(), 4, 15),
        ];

        let err = plotter.plot_all(&inputs).unwrap_err();
        assert!(err.to_string().contains("same number of epochs"));
        // Single-experiment figures were still written before merging failed.
        assert!(dir.path().join("baseline_loss-and-perplexity.svg").exists());
        assert!(dir.path().join("longer_loss-and-perplexity.svg").exists());
    }

    #[test]
    fn test_missing_total_loss_is_reported() {
        let dir = TempDir::new().unwrap();
        let plotter = LossPlotter::from_config(&PlotConfig::default()).unwrap();
        let mut only = input("baseline", dir.path(), 2, 10);
        only.losses.history.losses.remove(0);

        let err = plotter.plot_all(&[only]).unwrap_err();
        assert!(matches!(err, MlError::NotFound(_)));
    }

    #[test]
    fn test_nothing_to_plot() {
        let plotter = LossPlotter::from_config(&PlotConfig::default()).unwrap();
        assert!(plotter.plot_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_colormap_rejected() {
        let config = PlotConfig {
            colormap: "rainbow".into(),
            ..PlotConfig::default()
        };
        assert!(LossPlotter::from_config(&config).is_err());
    }
}
