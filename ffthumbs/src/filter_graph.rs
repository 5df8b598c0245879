//! Filter graph compilation.
//!
//! Turns the output list into a single `-filter_complex` expression. Outputs
//! are grouped by snapshot interval and then by scale config; every group
//! shares one `select` + `scale` chain and fans out through `split` when it
//! has more than one member. Sprite outputs get an additional `tile` stage.
//!
//! For two thumbnail outputs sampled every 6.5s into 320x180 the graph is:
//!
//! ```text
//! [0:v]select=bitor(gte(t-prev_selected_t\,6.5)\,isnan(prev_selected_t)),scale=320:180:force_original_aspect_ratio=decrease,pad=320:180:-1:-1:color=black,split=2[thumbs-0-out][thumbs-1-out]
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::config::{OutputConfig, OutputType, ScaleBehavior, ScaleConfig, SpriteDimensions};
use crate::validator::{ValidationError, validate_outputs};

/// Separator between graph statements.
pub const STATEMENT_DELIMITER: &str = ";";

/// Node names the compiler assigned to one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNodes {
    /// Split branch feeding the tile stage, set for sprites sharing a split.
    pub input: Option<String>,
    /// Terminal node mapped with `-map`.
    pub output: String,
}

/// A compiled filter graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    expression: String,
    nodes: Vec<OutputNodes>,
}

impl FilterGraph {
    /// The `-filter_complex` argument.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Node names, indexed like the compiled output list.
    pub fn nodes(&self) -> &[OutputNodes] {
        &self.nodes
    }

    /// `-map` argument for the output at `index`, e.g. `[thumbs-0-out]`.
    pub fn map_label(&self, index: usize) -> Option<String> {
        self.nodes.get(index).map(|n| format!("[{}]", n.output))
    }
}

/// Outputs sharing an interval and a scale config.
struct Bucket<'a> {
    scale: &'a ScaleConfig,
    members: Vec<usize>,
}

struct IntervalGroup<'a> {
    interval: Duration,
    buckets: Vec<Bucket<'a>>,
}

/// Validate `outputs` and compile them into a filter graph.
///
/// Node names are derived from each output's position in the list, so the
/// same list always compiles to the same graph.
pub fn compile(outputs: &[OutputConfig]) -> Result<FilterGraph, ValidationError> {
    validate_outputs(outputs)?;

    let mut nodes: Vec<Option<OutputNodes>> = vec![None; outputs.len()];
    let mut statements = Vec::new();

    for group in group_outputs(outputs) {
        for bucket in group.buckets {
            let mut head = String::new();
            write_select(&mut head, group.interval);
            head.push(',');
            head.push_str(&scale_directive(bucket.scale));

            if let &[position] = bucket.members.as_slice() {
                // Single consumer, no split needed.
                let output = &outputs[position];
                let out_name = output_node_name(output.output_type, position);
                if output.output_type == OutputType::Sprites {
                    head.push(',');
                    head.push_str(&tile_directive(&output.sprites));
                }
                write_label(&mut head, &out_name);
                statements.push(head);

                nodes[position] = Some(OutputNodes {
                    input: None,
                    output: out_name,
                });
                continue;
            }

            let _ = write!(head, ",split={}", bucket.members.len());

            let mut tiles = Vec::new();
            for &position in &bucket.members {
                let output = &outputs[position];
                let out_name = output_node_name(output.output_type, position);

                match output.output_type {
                    OutputType::Thumbs => {
                        write_label(&mut head, &out_name);
                        nodes[position] = Some(OutputNodes {
                            input: None,
                            output: out_name,
                        });
                    }
                    OutputType::Sprites => {
                        let in_name = sprite_branch_name(position);
                        write_label(&mut head, &in_name);

                        let mut tile = String::new();
                        write_label(&mut tile, &in_name);
                        tile.push_str(&tile_directive(&output.sprites));
                        write_label(&mut tile, &out_name);
                        tiles.push(tile);

                        nodes[position] = Some(OutputNodes {
                            input: Some(in_name),
                            output: out_name,
                        });
                    }
                }
            }

            statements.push(head);
            statements.extend(tiles);
        }
    }

    Ok(FilterGraph {
        expression: statements.join(STATEMENT_DELIMITER),
        nodes: nodes.into_iter().flatten().collect(),
    })
}

/// Group outputs by interval, then by scale config, keeping first-seen order.
fn group_outputs(outputs: &[OutputConfig]) -> Vec<IntervalGroup<'_>> {
    let mut groups: Vec<IntervalGroup<'_>> = Vec::new();

    for (position, output) in outputs.iter().enumerate() {
        let group_idx = match groups
            .iter()
            .position(|g| g.interval == output.snapshot_interval)
        {
            Some(idx) => idx,
            None => {
                groups.push(IntervalGroup {
                    interval: output.snapshot_interval,
                    buckets: Vec::new(),
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[group_idx];
        match group.buckets.iter_mut().find(|b| *b.scale == output.scale) {
            Some(bucket) => bucket.members.push(position),
            None => group.buckets.push(Bucket {
                scale: &output.scale,
                members: vec![position],
            }),
        }
    }

    groups
}

/// Render the `scale` stage for `scale`.
///
/// Fill/crop behaviors are only applied to fixed resolutions; with a derived
/// dimension there is no box to pad or crop to.
pub fn scale_directive(scale: &ScaleConfig) -> String {
    let (width, height) = (scale.width, scale.height);
    let mut directive = format!("scale={width}:{height}");

    if !scale.is_fixed_resolution() {
        return directive;
    }

    match scale.behavior {
        ScaleBehavior::None => {}
        ScaleBehavior::FillKeepAspect => {
            let _ = write!(
                directive,
                ":force_original_aspect_ratio=decrease,pad={width}:{height}:-1:-1:color=black"
            );
        }
        ScaleBehavior::CropToFit => {
            let _ = write!(
                directive,
                ":force_original_aspect_ratio=increase,crop={width}:{height}"
            );
        }
    }

    directive
}

/// Render the `-headers` argument, one `Key: Value\r\n` line per header.
pub fn headers_arg(headers: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in headers {
        let _ = write!(out, "{key}: {value}\r\n");
    }
    out
}

/// Interval in seconds, truncated to microseconds.
///
/// `f64`'s `Display` is the shortest round-tripping decimal and never uses
/// exponent notation, which is what ffmpeg's expression parser accepts.
fn interval_seconds(interval: Duration) -> String {
    let micros = interval.as_micros();
    format!("{}", micros as f64 / 1_000_000.0)
}

fn write_select(out: &mut String, interval: Duration) {
    out.push_str(r"[0:v]select=bitor(gte(t-prev_selected_t\,");
    out.push_str(&interval_seconds(interval));
    out.push_str(r")\,isnan(prev_selected_t))");
}

fn tile_directive(dimensions: &SpriteDimensions) -> String {
    format!("tile={}x{}", dimensions.columns, dimensions.rows)
}

fn write_label(out: &mut String, name: &str) {
    out.push('[');
    out.push_str(name);
    out.push(']');
}

fn output_node_name(output_type: OutputType, index: usize) -> String {
    format!("{}-{index}-out", output_type.node_prefix())
}

fn sprite_branch_name(index: usize) -> String {
    format!("{}-{index}", OutputType::Sprites.node_prefix())
}
