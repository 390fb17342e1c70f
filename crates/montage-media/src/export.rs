//! Export planning: turning a timeline snapshot into a render description.
//!
//! Planning is pure. The same project, settings and asset states always yield
//! the same plan, fingerprint and output path, which is what lets the
//! scheduler deduplicate identical export requests.

use montage_core::{
    AssetId, AssetLookup, AssetStatus, FrameRate, MontageError, RationalTime, Result,
};
use montage_timeline::{Project, PropertyName, TrackKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{EngineInvocation, EngineProgram};
use crate::presets::ExportSettings;

/// One clip's contribution to the render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSegment {
    pub track_index: usize,
    pub track_kind: TrackKind,
    pub clip_id: Uuid,
    pub asset_id: AssetId,
    /// Source or proxy file, depending on `use_proxies`.
    pub source_path: PathBuf,
    pub source_in: f64,
    pub source_out: f64,
    pub timeline_start: f64,
    /// Per-frame property values at the output frame rate.
    pub properties: BTreeMap<PropertyName, Vec<f64>>,
}

impl ExportSegment {
    pub fn duration(&self) -> f64 {
        self.source_out - self.source_in
    }
}

/// Immutable description of one export render.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub project_id: Uuid,
    pub project_name: String,
    pub segments: Vec<ExportSegment>,
    pub settings: ExportSettings,
    /// Timeline duration covered by the plan.
    pub duration: f64,
    pub output_path: PathBuf,
    pub fingerprint: u64,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    project_id: Uuid,
    segments: &'a [ExportSegment],
    settings: &'a ExportSettings,
}

impl ExportPlan {
    /// First eight hex digits of the fingerprint, as used in file names.
    pub fn fingerprint_hex8(&self) -> String {
        format!("{:016x}", self.fingerprint)[..8].to_string()
    }

    /// Number of output frames.
    pub fn total_frames(&self) -> u64 {
        RationalTime::from_seconds_f64(self.duration)
            .to_frames_ceil(self.settings.frame_rate)
            .unsigned_abs()
    }

    pub fn assets(&self) -> BTreeSet<AssetId> {
        self.segments.iter().map(|s| s.asset_id).collect()
    }

    /// Build the FFmpeg command for this plan.
    ///
    /// Every segment is placed at its timeline start over a black canvas
    /// (video) or mixed after a delay (audio), so the render covers exactly
    /// `duration` seconds. Higher track indices are drawn on top. Sampled
    /// property tables drive the per-frame filter expressions.
    pub fn invocation(&self) -> EngineInvocation {
        let mut args = vec!["-y".to_string()];

        for seg in &self.segments {
            args.extend([
                "-ss".to_string(),
                format!("{:.3}", seg.source_in),
                "-t".to_string(),
                format!("{:.3}", seg.duration()),
                "-i".to_string(),
                seg.source_path.to_string_lossy().into_owned(),
            ]);
        }

        let (width, height) = self.settings.resolution.dimensions();
        let rate = self.settings.frame_rate;
        let fps = format!("{}/{}", rate.numerator, rate.denominator);
        let mut filters = Vec::new();
        let mut canvas = None;
        let mut audio_labels = Vec::new();

        for (input, seg) in self.segments.iter().enumerate() {
            let start = decimal(seg.timeline_start);
            match seg.track_kind {
                TrackKind::Video => {
                    let below = match canvas.take() {
                        Some(label) => label,
                        None => {
                            filters.push(format!(
                                "color=c=black:s={width}x{height}:r={fps}:d={}[base]",
                                decimal(self.duration)
                            ));
                            "base".to_string()
                        }
                    };
                    let mut chain = format!(
                        "[{input}:v:0]setpts=PTS-STARTPTS,\
                         scale={width}:{height}:force_original_aspect_ratio=decrease,\
                         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}"
                    );
                    if let Some(geq) = self.transform_filter(seg) {
                        chain.push_str(",format=rgba,");
                        chain.push_str(&geq);
                    }
                    chain.push_str(&format!(",setpts=PTS+{start}/TB[v{input}]"));
                    filters.push(chain);

                    let end = decimal(seg.timeline_start + seg.duration());
                    let local = format!("(t-{start})");
                    let x = self.table_expr(seg, PropertyName::PositionX, &local);
                    let y = self.table_expr(seg, PropertyName::PositionY, &local);
                    let eval = if x.is_some() || y.is_some() {
                        ":eval=frame"
                    } else {
                        ""
                    };
                    filters.push(format!(
                        "[{below}][v{input}]overlay=x='{}':y='{}'{eval}:eof_action=pass:\
                         enable='between(t,{start},{end})'[o{input}]",
                        x.unwrap_or_else(|| "0".into()),
                        y.unwrap_or_else(|| "0".into()),
                    ));
                    canvas = Some(format!("o{input}"));
                }
                TrackKind::Audio => {
                    let volume = self
                        .table_expr(seg, PropertyName::Volume, "t")
                        .unwrap_or_else(|| "1".into());
                    let delay_ms = (seg.timeline_start * 1000.0).round() as u64;
                    filters.push(format!(
                        "[{input}:a:0]asetpts=PTS-STARTPTS,aresample=48000,\
                         volume=volume='{volume}':eval=frame,\
                         adelay=delays={delay_ms}:all=1[a{input}]"
                    ));
                    audio_labels.push(format!("[a{input}]"));
                }
            }
        }

        if let Some(label) = &canvas {
            filters.push(format!("[{label}]null[vout]"));
        }
        if !audio_labels.is_empty() {
            let mix = if audio_labels.len() == 1 {
                audio_labels.concat()
            } else {
                filters.push(format!(
                    "{}amix=inputs={}:duration=longest:normalize=0[amix]",
                    audio_labels.concat(),
                    audio_labels.len()
                ));
                "[amix]".to_string()
            };
            filters.push(format!(
                "{mix}apad,atrim=end={}[aout]",
                decimal(self.duration)
            ));
        }

        args.extend(["-filter_complex".to_string(), filters.join(";")]);
        if canvas.is_some() {
            args.extend(["-map".to_string(), "[vout]".to_string()]);
            args.extend(self.settings.encoder_args());
        }
        if !audio_labels.is_empty() {
            args.extend(["-map".to_string(), "[aout]".to_string()]);
            args.extend(self.settings.audio_args());
        } else {
            args.push("-an".to_string());
        }
        args.extend(["-t".to_string(), format!("{:.3}", self.duration)]);
        args.push(self.output_path.to_string_lossy().into_owned());

        EngineInvocation::new(EngineProgram::Ffmpeg, args).with_output(&self.output_path)
    }

    /// Opacity, scale and rotation of one video segment as a `geq` remap
    /// about the frame center, or `None` when nothing is animated.
    fn transform_filter(&self, seg: &ExportSegment) -> Option<String> {
        let opacity = self.table_expr(seg, PropertyName::Opacity, "T");
        let scale = self.table_expr(seg, PropertyName::Scale, "T");
        let rotation = self.table_expr(seg, PropertyName::Rotation, "T");
        if opacity.is_none() && scale.is_none() && rotation.is_none() {
            return None;
        }

        let (sx, sy, inside) = if scale.is_none() && rotation.is_none() {
            ("X".to_string(), "Y".to_string(), String::new())
        } else {
            let s = scale.unwrap_or_else(|| "1".into());
            let a = format!("({})*PI/180", rotation.unwrap_or_else(|| "0".into()));
            let sx = format!("(W/2+((X-W/2)*cos({a})+(Y-H/2)*sin({a}))/({s}))");
            let sy = format!("(H/2+((Y-H/2)*cos({a})-(X-W/2)*sin({a}))/({s}))");
            let inside = format!("*between({sx},0,W-1)*between({sy},0,H-1)");
            (sx, sy, inside)
        };
        let alpha = match opacity {
            Some(opacity) => format!("*({opacity})"),
            None => String::new(),
        };
        Some(format!(
            "geq=r='r({sx},{sy})':g='g({sx},{sy})':b='b({sx},{sy})':\
             a='alpha({sx},{sy}){inside}{alpha}'"
        ))
    }

    /// Expression for a sampled property of `seg`, in terms of `time`
    /// seconds since the segment started.
    fn table_expr(&self, seg: &ExportSegment, name: PropertyName, time: &str) -> Option<String> {
        let values = seg.properties.get(&name)?;
        Some(piecewise_expr(values, self.settings.frame_rate, time))
    }
}

/// Plan an export of `project`.
///
/// Fails with `IncompleteAssets` naming every referenced asset that is not
/// ready (`ProxyReady` when rendering from proxies, otherwise probed).
pub fn plan(
    project: &Project,
    settings: &ExportSettings,
    assets: &dyn AssetLookup,
) -> Result<ExportPlan> {
    settings.validate()?;

    let mut segments = Vec::new();
    let mut incomplete = BTreeSet::new();

    for (track_index, track) in project.tracks().iter().enumerate() {
        if track.kind == TrackKind::Audio && track.muted {
            continue;
        }
        for clip in track.clips().iter().filter(|c| c.enabled) {
            let Some(source_path) = render_source(assets, clip.asset_id, settings.use_proxies)
            else {
                incomplete.insert(clip.asset_id);
                continue;
            };

            let frames = RationalTime::from_seconds_f64(clip.duration)
                .to_frames_ceil(settings.frame_rate)
                .max(1) as usize;
            let mut properties = BTreeMap::new();
            for name in sampled_properties(track.kind, settings.composite) {
                let values = match clip.property(&name) {
                    Some(prop) => {
                        prop.sample_frames(clip.source_in_offset, settings.frame_rate, frames)
                    }
                    None if name == PropertyName::Volume => vec![name.default_value(); frames],
                    None => continue,
                };
                properties.insert(name, values);
            }

            segments.push(ExportSegment {
                track_index,
                track_kind: track.kind,
                clip_id: clip.id,
                asset_id: clip.asset_id,
                source_path,
                source_in: clip.source_in_offset,
                source_out: clip.source_out(),
                timeline_start: clip.start_time,
                properties,
            });
        }
    }

    if !incomplete.is_empty() {
        return Err(MontageError::IncompleteAssets {
            asset_ids: incomplete.into_iter().collect(),
        });
    }
    if segments.is_empty() {
        return Err(MontageError::InvalidParameter(format!(
            "project {:?} has no enabled clips to export",
            project.name
        )));
    }

    let fingerprint = fingerprint(&FingerprintInput {
        project_id: project.id,
        segments: &segments,
        settings,
    })?;
    let duration = segments
        .iter()
        .map(|s| s.timeline_start + s.duration())
        .fold(0.0, f64::max);

    let mut plan = ExportPlan {
        project_id: project.id,
        project_name: project.name.clone(),
        segments,
        settings: settings.clone(),
        duration,
        output_path: PathBuf::new(),
        fingerprint,
    };
    plan.output_path = settings.output_dir.join(format!(
        "{}_{}.{}",
        slug(&project.name),
        plan.fingerprint_hex8(),
        settings.format.extension()
    ));

    debug!(
        project = %project.name,
        segments = plan.segments.len(),
        fingerprint = %plan.fingerprint_hex8(),
        "planned export"
    );
    Ok(plan)
}

/// File to read for an asset, or `None` when it is not ready for this export.
fn render_source(assets: &dyn AssetLookup, id: AssetId, use_proxies: bool) -> Option<PathBuf> {
    let asset = assets.asset(id)?;
    match (asset.status, use_proxies) {
        (AssetStatus::ProxyReady, true) => asset.proxy_path,
        (AssetStatus::Probed | AssetStatus::ProxyReady, false) => Some(asset.source_path),
        _ => None,
    }
}

fn sampled_properties(kind: TrackKind, composite: bool) -> Vec<PropertyName> {
    match kind {
        TrackKind::Video if composite => PropertyName::VISUAL.to_vec(),
        TrackKind::Video => Vec::new(),
        TrackKind::Audio => vec![PropertyName::Volume],
    }
}

/// Per-frame table as a piecewise-linear FFmpeg expression of `time`.
///
/// Knots are kept wherever the slope changes, so linear ramps and holds
/// collapse to a handful of `if(lt(..))` branches while eased curves keep
/// every frame.
fn piecewise_expr(values: &[f64], rate: FrameRate, time: &str) -> String {
    let Some(&first) = values.first() else {
        return "0".to_string();
    };
    if values.iter().all(|v| (v - first).abs() < TABLE_EPSILON) {
        return decimal(first);
    }

    let last = values.len() - 1;
    let mut knots = vec![0];
    knots.extend((1..last).filter(|&i| {
        (values[i - 1] - 2.0 * values[i] + values[i + 1]).abs() > TABLE_EPSILON
    }));
    knots.push(last);

    let at = |i: usize| RationalTime::from_frames(i as i64, rate).to_seconds_f64();
    let mut expr = decimal(values[last]);
    for pair in knots.windows(2).rev() {
        let (a, b) = (pair[0], pair[1]);
        let (t0, t1) = (at(a), at(b));
        let interp = format!(
            "{}+({})*({time}-{})/{}",
            decimal(values[a]),
            decimal(values[b] - values[a]),
            decimal(t0),
            decimal(t1 - t0)
        );
        expr = format!("if(lt({time},{}),{interp},{expr})", decimal(t1));
    }
    expr
}

const TABLE_EPSILON: f64 = 1e-9;

fn decimal(value: f64) -> String {
    format!("{value:.6}")
}

/// First eight bytes of the SHA-256 of the canonical JSON input.
fn fingerprint(input: &FingerprintInput<'_>) -> Result<u64> {
    let bytes = serde_json::to_vec(input)
        .map_err(|e| MontageError::Serialization(format!("export fingerprint: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(head))
}

/// Lowercase ASCII slug for file names.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}
