//! Scheduled convolution pipeline
//!
//! A [`ConvolutionPipeline`] pads one input image, runs every sequence of a
//! [`ParallelConvolutionSequences`] set on it concurrently and fans their outputs
//! into a single image with a [`Combine`] operation. Each run is expressed as a
//! task graph on a [`Scheduler`]:
//!
//! ```text
//!                 +-> stage 0 -> stage 1 -> ... (sequence 0) -+
//! input -> pad ---+                                           +-> combine
//!                 +-> stage 0 -> ...         (sequence N-1) --+
//! ```
//!
//! All buffers are owned by the pipeline between runs and are handed to the
//! scheduled units for the duration of a run, so no image can be read before the
//! run is completed.

use std::sync::Arc;

use thiserror::Error;
use vision_union_image::{CpuAllocator, Image, ImageError, ImageSize};

use crate::combine::{self, Combine, CombineError, Magnitude, DEFAULT_CHUNK_SIZE};
use crate::filter::{
    kernels, Convolution, ConvolutionError, ConvolutionSequence, ParallelConvolutionSequences,
};
use crate::padding::{self, ConvolutionPadMode, Padding, PaddingError};
use crate::scheduling::{Scheduler, SchedulerError, Task, TaskHandle};

/// Errors raised by a [`ConvolutionPipeline`].
#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
    /// A pipeline needs at least two sequences to combine.
    #[error("A pipeline needs at least two sequences, got {0}")]
    NotEnoughSequences(usize),

    /// A sequence produces an output of a different size than the first one.
    #[error("Sequence {0} produces {1}, expected {2}")]
    SequenceOutputMismatch(usize, ImageSize, ImageSize),

    /// The scheduled input does not have the size the pipeline was built for.
    #[error("Input image has size {0}, expected {1}")]
    InputSizeMismatch(ImageSize, ImageSize),

    /// A run is outstanding; it must be completed first.
    #[error("The pipeline is already scheduled")]
    AlreadyScheduled,

    /// There is no run to complete.
    #[error("The pipeline is not scheduled")]
    NotScheduled,

    /// Outputs are only readable after a run has been completed.
    #[error("The pipeline has no completed run")]
    NotComplete,

    /// There is no sequence at this index.
    #[error("Sequence index {0} out of bounds for {1} sequences")]
    SequenceIndexOutOfBounds(usize, usize),

    /// A buffer is still referenced after its run completed.
    #[error("A pipeline buffer is still in use")]
    BufferInUse,

    /// Error from a convolution.
    #[error(transparent)]
    Convolution(#[from] ConvolutionError),

    /// Error from the padding.
    #[error(transparent)]
    Padding(#[from] PaddingError),

    /// Error from the combine stage.
    #[error(transparent)]
    Combine(#[from] CombineError),

    /// Error from the task layer.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Error from the image crate.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No run is outstanding and no output is readable.
    Unscheduled,
    /// A run is outstanding.
    Scheduled,
    /// The last run completed; outputs are readable.
    Complete,
}

/// Options of a [`ConvolutionPipeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// How the input is padded relative to the first convolution.
    pub pad_mode: ConvolutionPadMode,
    /// Value written to the padded border.
    pub pad_value: f32,
    /// Number of elements per parallel work item of the combine stage.
    pub combine_chunk_size: usize,
    /// Size of a dedicated thread pool; `None` runs on the global rayon pool.
    pub num_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pad_mode: ConvolutionPadMode::Same,
            pad_value: 0.0,
            combine_chunk_size: DEFAULT_CHUNK_SIZE,
            num_threads: None,
        }
    }
}

impl PipelineConfig {
    /// Set the convolution pad mode.
    pub fn with_pad_mode(mut self, pad_mode: ConvolutionPadMode) -> Self {
        self.pad_mode = pad_mode;
        self
    }

    /// Set the border value.
    pub fn with_pad_value(mut self, pad_value: f32) -> Self {
        self.pad_value = pad_value;
        self
    }

    /// Set the chunk size of the combine stage.
    pub fn with_combine_chunk_size(mut self, chunk_size: usize) -> Self {
        self.combine_chunk_size = chunk_size;
        self
    }

    /// Run on a dedicated pool of `num_threads` threads.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }
}

type SharedImage = Arc<Image<f32, 1>>;

struct ScheduledRun {
    padded: Task<SharedImage>,
    stages: Vec<Vec<Task<SharedImage>>>,
    combined: Task<Image<f32, 1>>,
}

/// Pads an input, runs parallel convolution sequences on it and combines their outputs.
///
/// # Example
///
/// ```
/// use vision_union_image::{CpuAllocator, Image, ImageSize};
/// use vision_union_imgproc::pipeline::{ConvolutionPipeline, PipelineConfig};
///
/// let size = ImageSize { width: 5, height: 5 };
/// let mut pipeline = ConvolutionPipeline::sobel(size, PipelineConfig::default()).unwrap();
///
/// let input = Image::<f32, 1, _>::from_size_val(size, 1.0, CpuAllocator).unwrap();
/// let handle = pipeline.schedule(input).unwrap();
/// handle.complete();
/// pipeline.complete().unwrap();
///
/// assert_eq!(pipeline.output().unwrap().size(), size);
/// ```
pub struct ConvolutionPipeline<F: Combine + 'static = Magnitude> {
    input_size: ImageSize,
    padding: Padding,
    output_size: ImageSize,
    config: PipelineConfig,
    sequences: ParallelConvolutionSequences,
    combiner: Arc<F>,
    scheduler: Scheduler,
    padded: Option<Image<f32, 1>>,
    output: Option<Image<f32, 1>>,
    state: PipelineState,
    run: Option<ScheduledRun>,
}

impl ConvolutionPipeline<Magnitude> {
    /// Gradient magnitude with the 3x3 Sobel kernels, one sequence per axis.
    pub fn sobel(input_size: ImageSize, config: PipelineConfig) -> Result<Self, PipelineError> {
        let sequences = ParallelConvolutionSequences::new(vec![
            ConvolutionSequence::single(Convolution::unit(kernels::sobel_x()?)),
            ConvolutionSequence::single(Convolution::unit(kernels::sobel_y()?)),
        ])?;
        Self::new(input_size, sequences, Magnitude, config)
    }

    /// Gradient magnitude with the separable Sobel factors, two stages per axis.
    ///
    /// The padding follows the first, horizontal stage, so the output loses two
    /// rows relative to the input in `Same` mode.
    pub fn sobel_separable(
        input_size: ImageSize,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let (dx, smooth_y) = kernels::sobel_x_separable()?;
        let (smooth_x, dy) = kernels::sobel_y_separable()?;
        let sequences = ParallelConvolutionSequences::new(vec![
            ConvolutionSequence::new(vec![Convolution::unit(dx), Convolution::unit(smooth_y)])?,
            ConvolutionSequence::new(vec![Convolution::unit(smooth_x), Convolution::unit(dy)])?,
        ])?;
        Self::new(input_size, sequences, Magnitude, config)
    }
}

impl<F: Combine + 'static> ConvolutionPipeline<F> {
    /// Build a pipeline for inputs of size `input_size`.
    ///
    /// The padding is derived from the first convolution of the first sequence and
    /// the padded and output buffers are allocated up front.
    ///
    /// # Errors
    ///
    /// Fails if there are fewer than two sequences, if a chain does not fit the
    /// padded input, if the sequences disagree on their output size or if the
    /// chunk size is zero.
    pub fn new(
        input_size: ImageSize,
        sequences: ParallelConvolutionSequences,
        combiner: F,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if sequences.width() < 2 {
            return Err(PipelineError::NotEnoughSequences(sequences.width()));
        }
        if config.combine_chunk_size == 0 {
            return Err(CombineError::InvalidChunkSize.into());
        }

        let padding = config
            .pad_mode
            .padding(input_size, sequences.first_convolution());
        let padded_size = padding::padded_size(input_size, &padding);

        let sizes = sequences.output_sizes(padded_size)?;
        let output_size = sizes
            .first()
            .copied()
            .ok_or(PipelineError::NotEnoughSequences(0))?;
        if let Some((i, size)) = sizes
            .iter()
            .enumerate()
            .find(|(_, size)| **size != output_size)
        {
            return Err(PipelineError::SequenceOutputMismatch(i, *size, output_size));
        }

        let scheduler = match config.num_threads {
            Some(n) => Scheduler::with_threads(n)?,
            None => Scheduler::global(),
        };

        let padded = Image::from_size_val(padded_size, config.pad_value, CpuAllocator)?;
        let output = Image::from_size_val(output_size, 0.0, CpuAllocator)?;

        log::debug!(
            "pipeline: input {input_size}, padding ({padding}), padded {padded_size}, {} sequences -> {output_size}",
            sequences.width()
        );

        Ok(Self {
            input_size,
            padding,
            output_size,
            config,
            sequences,
            combiner: Arc::new(combiner),
            scheduler,
            padded: Some(padded),
            output: Some(output),
            state: PipelineState::Unscheduled,
            run: None,
        })
    }

    /// Run on `scheduler` instead of the one chosen from the config.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// The size of the inputs the pipeline accepts.
    pub fn input_size(&self) -> ImageSize {
        self.input_size
    }

    /// The padding applied to every input.
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// The size of the combined output.
    pub fn output_size(&self) -> ImageSize {
        self.output_size
    }

    /// The options the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The sequences of the pipeline.
    pub fn sequences(&self) -> &ParallelConvolutionSequences {
        &self.sequences
    }

    /// The scheduler the units run on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Schedule a run on `input` and return the handle of its final unit.
    ///
    /// Every buffer is prepared before the first unit is submitted, so an error
    /// leaves nothing running.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyScheduled`] while a previous run is
    /// outstanding and [`PipelineError::InputSizeMismatch`] for an input of the
    /// wrong size.
    pub fn schedule(
        &mut self,
        input: impl Into<Arc<Image<f32, 1>>>,
    ) -> Result<TaskHandle, PipelineError> {
        if self.state == PipelineState::Scheduled {
            return Err(PipelineError::AlreadyScheduled);
        }
        let input = input.into();
        if input.size() != self.input_size {
            return Err(PipelineError::InputSizeMismatch(
                input.size(),
                self.input_size,
            ));
        }

        // prepare every buffer first; nothing below may fail once units are submitted
        let padded_size = padding::padded_size(self.input_size, &self.padding);
        let mut padded = match self.padded.take() {
            Some(image) if image.size() == padded_size => image,
            _ => Image::from_size_val(padded_size, self.config.pad_value, CpuAllocator)?,
        };
        let mut output = match self.output.take() {
            Some(image) if image.size() == self.output_size => image,
            _ => Image::from_size_val(self.output_size, 0.0, CpuAllocator)?,
        };
        let mut buffers = Vec::with_capacity(self.sequences.width());
        for seq in self.sequences.iter_mut() {
            let sizes = seq.stage_sizes(padded_size)?;
            let mut previous = seq.take_images().into_iter();
            let images = sizes
                .into_iter()
                .map(|size| match previous.next() {
                    Some(image) if image.size() == size => Ok(image),
                    _ => Image::from_size_val(size, 0.0, CpuAllocator),
                })
                .collect::<Result<Vec<_>, _>>()?;
            buffers.push(images);
        }

        let padding = self.padding;
        let pad_value = self.config.pad_value;
        let padded = self.scheduler.try_spawn(move || {
            let src: &Image<f32, 1> = &input;
            padding::constant_into(src, &mut padded, &padding, pad_value)?;
            Ok::<_, PaddingError>(Arc::new(padded))
        });

        let mut stages = Vec::with_capacity(buffers.len());
        for (seq, images) in self.sequences.iter().zip(buffers) {
            let mut chain: Vec<Task<SharedImage>> = Vec::with_capacity(images.len());
            for (conv, mut dst) in seq.convolutions().iter().cloned().zip(images) {
                let src = chain.last().unwrap_or(&padded);
                let task = self.scheduler.try_then(src, move |src: &SharedImage| {
                    let src: &Image<f32, 1> = src;
                    conv.convolve(src, &mut dst)?;
                    Ok::<_, ConvolutionError>(Arc::new(dst))
                });
                chain.push(task);
            }
            stages.push(chain);
        }

        let combiner = Arc::clone(&self.combiner);
        let chunk_size = self.config.combine_chunk_size;
        let last_stages = stages.iter().filter_map(|chain| chain.last()).collect::<Vec<_>>();
        let combined = self
            .scheduler
            .try_join(&last_stages, move |outputs: &[&SharedImage]| {
                fold_outputs(outputs, &mut output, &*combiner, chunk_size)?;
                Ok::<_, CombineError>(output)
            });

        let handle = combined.handle().clone();
        log::debug!(
            "pipeline scheduled: {} units, final task {}",
            2 + stages.iter().map(Vec::len).sum::<usize>(),
            handle.id()
        );

        self.run = Some(ScheduledRun {
            padded,
            stages,
            combined,
        });
        self.state = PipelineState::Scheduled;
        Ok(handle)
    }

    /// Wait for the outstanding run and take its buffers back.
    ///
    /// This blocks the calling thread. Do not call it from a worker of the pool
    /// the pipeline schedules on, such as inside a rayon `par_iter` when the
    /// pipeline uses the global pool: the run may need that very thread and never
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotScheduled`] if no run is outstanding, or the
    /// error of a unit that failed; the pipeline is then left unscheduled.
    pub fn complete(&mut self) -> Result<(), PipelineError> {
        let ScheduledRun {
            padded,
            stages,
            combined,
        } = self.run.take().ok_or(PipelineError::NotScheduled)?;
        self.state = PipelineState::Unscheduled;

        // the final unit depends on every other one
        let output = combined.into_inner();

        self.padded = reclaim(padded).ok();
        let mut first_error = None;
        for (seq, chain) in self.sequences.iter_mut().zip(stages) {
            match chain.into_iter().map(reclaim).collect::<Result<Vec<_>, _>>() {
                Ok(images) => seq.set_images(images),
                Err(e) => {
                    seq.set_images(Vec::new());
                    first_error.get_or_insert(e);
                }
            }
        }

        self.output = Some(output?);
        if let Some(e) = first_error {
            return Err(e);
        }

        self.state = PipelineState::Complete;
        log::debug!("pipeline run complete");
        Ok(())
    }

    /// Schedule a run on `input`, wait for it and return the combined output.
    ///
    /// Blocks like [`ConvolutionPipeline::complete`] and has the same restriction:
    /// never call it from a worker thread of the pipeline's own pool.
    pub fn run(
        &mut self,
        input: impl Into<Arc<Image<f32, 1>>>,
    ) -> Result<&Image<f32, 1>, PipelineError> {
        self.schedule(input)?;
        self.complete()?;
        self.output()
    }

    fn ensure_complete(&self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Complete => Ok(()),
            _ => Err(PipelineError::NotComplete),
        }
    }

    /// The combined output of the last completed run.
    pub fn output(&self) -> Result<&Image<f32, 1>, PipelineError> {
        self.ensure_complete()?;
        self.output.as_ref().ok_or(PipelineError::NotComplete)
    }

    /// The padded input of the last completed run.
    pub fn padded_input(&self) -> Result<&Image<f32, 1>, PipelineError> {
        self.ensure_complete()?;
        self.padded.as_ref().ok_or(PipelineError::NotComplete)
    }

    /// The output of sequence `index` in the last completed run.
    pub fn sequence_output(&self, index: usize) -> Result<&Image<f32, 1>, PipelineError> {
        Ok(self.sequence(index)?.output()?)
    }

    /// Every stage image of sequence `index` in the last completed run.
    pub fn sequence_images(&self, index: usize) -> Result<&[Image<f32, 1>], PipelineError> {
        Ok(self.sequence(index)?.images()?)
    }

    fn sequence(&self, index: usize) -> Result<&ConvolutionSequence, PipelineError> {
        self.ensure_complete()?;
        self.sequences
            .get(index)
            .ok_or(PipelineError::SequenceIndexOutOfBounds(
                index,
                self.sequences.width(),
            ))
    }

    /// Release every buffer. The next run allocates them again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyScheduled`] while a run is outstanding.
    pub fn release(&mut self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Scheduled {
            return Err(PipelineError::AlreadyScheduled);
        }
        self.padded.take().into_iter().for_each(Image::release);
        self.output.take().into_iter().for_each(Image::release);
        self.sequences.release();
        self.state = PipelineState::Unscheduled;
        log::debug!("pipeline buffers released");
        Ok(())
    }
}

/// Take the image of a completed stage back out of its task.
fn reclaim(task: Task<SharedImage>) -> Result<Image<f32, 1>, PipelineError> {
    Arc::try_unwrap(task.into_inner()?).map_err(|_| PipelineError::BufferInUse)
}

/// Combine the first two outputs into `dst`, then fold the others into it.
fn fold_outputs<F: Combine + ?Sized>(
    outputs: &[&SharedImage],
    dst: &mut Image<f32, 1>,
    op: &F,
    chunk_size: usize,
) -> Result<(), CombineError> {
    if let [first, second, rest @ ..] = outputs {
        let first: &Image<f32, 1> = first;
        let second: &Image<f32, 1> = second;
        combine::combine(first, second, dst, op, chunk_size)?;
        for other in rest {
            let other: &Image<f32, 1> = other;
            combine::combine_in_place(dst, other, op, chunk_size)?;
        }
    }
    Ok(())
}
