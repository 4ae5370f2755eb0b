//! Per-rank compositing pipeline
//!
//! Every rank runs the same sequence:
//!
//! 1. select its shard and reduce the shard bounds to a camera distance
//! 2. all-gather the distances and derive the shared visibility order
//! 3. render the shard locally
//! 4. gather frames on the coordinator
//! 5. coordinator only: composite in visibility order, resolve, write output
//! 6. barrier, so no rank exits before the run is complete
//!
//! Any error on any rank is fatal for the run; there is no partial result.

use crate::compositor::{composite_in_order, CompositeError};
use crate::dataset::Block;
use crate::frame::RgbaFrame;
use crate::output::{order_file_name, save_frame, CompositeSummary, ImageKind, OutputError, IMAGE_EXTENSION, SUMMARY_FILE};
use crate::partition::Shard;
use crate::render::{render_local, RenderError, Renderer};
use crate::settings::RunSettings;
use crate::telemetry::{Phase, PhaseProfiler, PhaseTimings};
use crate::transport::{gather_frames, Communicator, TransportError};
use crate::visibility::{max_corner_distance, VisibilityOrder};

/// Errors that end a rank's run
#[derive(Debug)]
pub enum PipelineError {
    Transport(TransportError),
    Render(RenderError),
    Composite(CompositeError),
    Output(OutputError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Transport(e) => write!(f, "{}", e),
            PipelineError::Render(e) => write!(f, "{}", e),
            PipelineError::Composite(e) => write!(f, "Composite error: {}", e),
            PipelineError::Output(e) => write!(f, "Output error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<TransportError> for PipelineError {
    fn from(e: TransportError) -> Self {
        PipelineError::Transport(e)
    }
}

impl From<RenderError> for PipelineError {
    fn from(e: RenderError) -> Self {
        PipelineError::Render(e)
    }
}

impl From<CompositeError> for PipelineError {
    fn from(e: CompositeError) -> Self {
        PipelineError::Composite(e)
    }
}

impl From<OutputError> for PipelineError {
    fn from(e: OutputError) -> Self {
        PipelineError::Output(e)
    }
}

/// What one rank ends up with after a successful run
#[derive(Debug)]
pub struct RankOutcome {
    pub rank: usize,
    /// Number of elements this rank owned
    pub elements: usize,
    pub order: VisibilityOrder,
    /// The resolved final image; only the coordinator has one
    pub final_frame: Option<RgbaFrame>,
    pub timings: PhaseTimings,
}

/// Run one rank of a compositing job over `comm`.
pub fn run_rank<C, R>(
    comm: &mut C,
    settings: &RunSettings,
    blocks: &[Block],
    renderer: &R,
) -> Result<RankOutcome, PipelineError>
where
    C: Communicator + ?Sized,
    R: Renderer + ?Sized,
{
    let (rank, size) = (comm.rank(), comm.size());
    let (width, height) = (settings.image_width, settings.image_height);
    let camera = settings.camera();
    let mut profiler = PhaseProfiler::new(rank);

    profiler.begin(Phase::Partition);
    let shard = Shard::select(blocks, rank, size);
    let distance = max_corner_distance(camera.position, shard.bounds());
    tracing::info!(rank, elements = shard.blocks().len(), distance, "Shard ready");

    profiler.begin(Phase::Exchange);
    let distances = comm.all_gather(distance)?;
    if distances.len() != size {
        return Err(TransportError::ProtocolViolation(format!(
            "all-gather returned {} values for {} ranks",
            distances.len(),
            size
        ))
        .into());
    }
    let order = VisibilityOrder::from_distances(&distances);
    if comm.is_coordinator() {
        for record in order.records() {
            tracing::info!(rank = record.rank, distance = record.max_distance, "Visibility order (back to front)");
        }
    }
    let order_index = order
        .position_of(rank)
        .ok_or_else(|| TransportError::ProtocolViolation(format!("rank {} missing from visibility order", rank)))?;

    profiler.begin(Phase::Render);
    let rendered = render_local(renderer, &shard, &camera, width, height)?;
    if settings.save_partials {
        let name = order_file_name(ImageKind::Partial, order_index, rank, IMAGE_EXTENSION);
        save_frame(rendered.frame(), &settings.output_path(&name))?;
    }

    profiler.begin(Phase::Transport);
    let gathered = gather_frames(comm, rendered)?;

    let final_frame = match gathered {
        Some(gathered) => {
            if settings.save_partials {
                profiler.begin(Phase::Output);
                for (source, frame) in gathered.frames().iter().enumerate() {
                    let index = order.position_of(source).ok_or(CompositeError::MissingFrame { rank: source })?;
                    let name = order_file_name(ImageKind::Received, index, source, IMAGE_EXTENSION);
                    save_frame(frame, &settings.output_path(&name))?;
                }
            }

            profiler.begin(Phase::Composite);
            let final_frame = composite_in_order(
                &order,
                gathered.frames(),
                settings.background.to_array(),
                settings.alpha_epsilon,
            )?;

            profiler.begin(Phase::Output);
            let final_path = settings.final_image_path();
            save_frame(&final_frame, &final_path)?;
            profiler.finish();

            let summary = CompositeSummary::new(
                &order,
                width,
                height,
                final_path.display().to_string(),
                profiler.timings(),
            );
            summary.save(&settings.output_path(SUMMARY_FILE))?;
            tracing::info!(path = %final_path.display(), ranks = size, "Final image written");
            Some(final_frame)
        }
        None => None,
    };
    profiler.finish();

    comm.barrier()?;

    Ok(RankOutcome {
        rank,
        elements: shard.blocks().len(),
        order,
        final_frame,
        timings: profiler.timings(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::blend::resolve_background;
    use crate::dataset::block_grid;
    use crate::frame::Pixel;
    use crate::output::parse_order_file_name;
    use crate::render::SplatRenderer;
    use crate::transport::LocalGroup;
    use std::path::PathBuf;
    use std::thread;

    fn test_settings(name: &str, save_partials: bool) -> (RunSettings, PathBuf) {
        let dir = std::env::temp_dir().join(format!("shard-compositor-{}-{}", name, std::process::id()));
        let settings = RunSettings {
            image_width: 40,
            image_height: 32,
            blocks_per_axis: 2,
            output_dir: dir.display().to_string(),
            save_partials,
            ..RunSettings::default()
        };
        (settings, dir)
    }

    /// Run every rank of a local group on its own thread
    fn run_group(size: usize, settings: &RunSettings, blocks: &[Block]) -> Vec<RankOutcome> {
        let handles: Vec<_> = LocalGroup::new(size)
            .into_iter()
            .map(|mut comm| {
                let settings = settings.clone();
                let blocks = blocks.to_vec();
                thread::spawn(move || run_rank(&mut comm, &settings, &blocks, &SplatRenderer::default()).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    fn bits(frame: &RgbaFrame) -> Vec<u32> {
        frame.samples().iter().map(|s| s.to_bits()).collect()
    }

    #[test]
    fn test_multi_rank_run_matches_sequential_composite() {
        let (settings, dir) = test_settings("multi", false);
        let blocks = block_grid(settings.blocks_per_axis);
        let outcomes = run_group(4, &settings, &blocks);

        // Reproduce the run on one thread
        let camera = settings.camera();
        let renderer = SplatRenderer::default();
        let mut frames = Vec::new();
        let mut distances = Vec::new();
        for rank in 0..4 {
            let shard = Shard::select(&blocks, rank, 4);
            distances.push(max_corner_distance(camera.position, shard.bounds()));
            frames.push(renderer.render(&shard, &camera, 40, 32).unwrap());
        }
        let order = VisibilityOrder::from_distances(&distances);
        let expected = composite_in_order(&order, &frames, settings.background.to_array(), settings.alpha_epsilon).unwrap();

        for outcome in &outcomes {
            assert_eq!(outcome.order, order);
            assert_eq!(outcome.elements, 2);
        }
        let final_frame = outcomes[0].final_frame.as_ref().unwrap();
        assert_eq!(bits(final_frame), bits(&expected));
        assert!(outcomes[1..].iter().all(|o| o.final_frame.is_none()));

        assert!(settings.final_image_path().exists());
        assert!(settings.output_path(SUMMARY_FILE).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_single_process_equals_direct_background_blend() {
        let (settings, dir) = test_settings("single", false);
        let blocks = block_grid(settings.blocks_per_axis);
        let outcome = run_group(1, &settings, &blocks).remove(0);
        let final_frame = outcome.final_frame.unwrap();

        let shard = Shard::select(&blocks, 0, 1);
        let rendered = SplatRenderer::default()
            .render(&shard, &settings.camera(), 40, 32)
            .unwrap();
        let background = settings.background.to_array();
        let direct: Vec<f32> = rendered
            .pixels()
            .iter()
            .flat_map(|&[r, g, b, a]| {
                let covered: Pixel = if a > settings.alpha_epsilon {
                    [r * a * 1.0, g * a * 1.0, b * a * 1.0, a * 1.0]
                } else {
                    [0.0; 4]
                };
                resolve_background(covered, background)
            })
            .collect();

        assert_eq!(outcome.order.ranks().collect::<Vec<_>>(), vec![0]);
        assert_eq!(bits(&final_frame), direct.iter().map(|s| s.to_bits()).collect::<Vec<_>>());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ranks_without_elements_do_not_change_the_image() {
        let (settings, dir) = test_settings("empty-ranks", false);
        let blocks = block_grid(1);

        let alone = run_group(1, &settings, &blocks).remove(0).final_frame.unwrap();
        let outcomes = run_group(3, &settings, &blocks);
        assert_eq!(outcomes[1].elements, 0);
        assert_eq!(outcomes[2].elements, 0);

        // Empty ranks report distance 0 and therefore come last
        assert_eq!(outcomes[0].order.ranks().collect::<Vec<_>>(), vec![0, 1, 2]);
        let shared = outcomes[0].final_frame.as_ref().unwrap();
        assert_eq!(bits(shared), bits(&alone));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_debug_images_are_named_by_order_and_rank() {
        let (settings, dir) = test_settings("partials", true);
        let blocks = block_grid(settings.blocks_per_axis);
        let outcomes = run_group(3, &settings, &blocks);
        let order = &outcomes[0].order;

        let mut partial = 0;
        let mut received = 0;
        for entry in std::fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            if let Some((kind, index, rank)) = parse_order_file_name(&name) {
                assert_eq!(order.position_of(rank), Some(index));
                match kind {
                    ImageKind::Partial => partial += 1,
                    ImageKind::Received => received += 1,
                }
            }
        }
        assert_eq!((partial, received), (3, 3));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
