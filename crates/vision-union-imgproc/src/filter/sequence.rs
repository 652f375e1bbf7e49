use rayon::prelude::*;
use vision_union_image::{CpuAllocator, Image, ImageAllocator, ImageSize};

use super::{Convolution, ConvolutionError};

/// An ordered chain of convolutions applied stage by stage to one input.
///
/// Each stage reads the image written by the previous stage (the first stage reads
/// the externally padded input) and writes a freshly allocated image. The sequence
/// owns every stage image until it is released, so intermediates stay available
/// for inspection.
#[derive(Clone, Debug)]
pub struct ConvolutionSequence {
    convolutions: Vec<Convolution>,
    images: Vec<Image<f32, 1>>,
    released: bool,
}

impl ConvolutionSequence {
    /// Create a sequence from its stages, in application order.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::EmptySequence`] if `convolutions` is empty.
    pub fn new(convolutions: Vec<Convolution>) -> Result<Self, ConvolutionError> {
        if convolutions.is_empty() {
            return Err(ConvolutionError::EmptySequence);
        }
        Ok(Self {
            convolutions,
            images: Vec::new(),
            released: false,
        })
    }

    /// Create a sequence with a single stage.
    pub fn single(convolution: Convolution) -> Self {
        Self {
            convolutions: vec![convolution],
            images: Vec::new(),
            released: false,
        }
    }

    /// The stages of the sequence.
    pub fn convolutions(&self) -> &[Convolution] {
        &self.convolutions
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.convolutions.len()
    }

    /// Always false: a sequence has at least one stage.
    pub fn is_empty(&self) -> bool {
        self.convolutions.is_empty()
    }

    /// The first stage, the one the input padding is derived from.
    pub fn first(&self) -> &Convolution {
        &self.convolutions[0]
    }

    /// Size of the image written by every stage, for an input of size `input`.
    pub fn stage_sizes(&self, input: ImageSize) -> Result<Vec<ImageSize>, ConvolutionError> {
        let mut size = input;
        self.convolutions
            .iter()
            .map(|conv| {
                size = conv.output_size(size)?;
                Ok(size)
            })
            .collect()
    }

    /// Size of the image written by the last stage.
    pub fn output_size(&self, input: ImageSize) -> Result<ImageSize, ConvolutionError> {
        self.convolutions
            .iter()
            .try_fold(input, |size, conv| conv.output_size(size))
    }

    /// Run every stage in order on the calling thread's rayon pool.
    ///
    /// Images from a previous run are reused when their sizes still match.
    ///
    /// # Returns
    ///
    /// The image written by the last stage.
    pub fn run<A: ImageAllocator>(
        &mut self,
        input: &Image<f32, 1, A>,
    ) -> Result<&Image<f32, 1>, ConvolutionError> {
        let sizes = self.stage_sizes(input.size())?;
        let mut previous = std::mem::take(&mut self.images).into_iter();
        let mut images: Vec<Image<f32, 1>> = Vec::with_capacity(sizes.len());

        for (conv, size) in self.convolutions.iter().zip(sizes) {
            let mut dst = match previous.next() {
                Some(image) if image.size() == size => image,
                _ => Image::from_size_val(size, 0.0, CpuAllocator)?,
            };
            match images.last() {
                Some(src) => conv.convolve(src, &mut dst)?,
                None => conv.convolve(input, &mut dst)?,
            }
            images.push(dst);
        }

        self.images = images;
        self.released = false;
        self.output()
    }

    /// Every stage image from the last run, in stage order.
    pub fn images(&self) -> Result<&[Image<f32, 1>], ConvolutionError> {
        if self.released {
            return Err(ConvolutionError::Released);
        }
        if self.images.is_empty() {
            return Err(ConvolutionError::NoOutput);
        }
        Ok(&self.images)
    }

    /// The image written by the last stage.
    pub fn output(&self) -> Result<&Image<f32, 1>, ConvolutionError> {
        self.images()?.last().ok_or(ConvolutionError::NoOutput)
    }

    /// Release every stage image. Reading them afterwards is an error until the
    /// sequence runs again.
    pub fn release(&mut self) {
        self.images.drain(..).for_each(Image::release);
        self.released = true;
    }

    /// Hand the stage buffers out, e.g. to scheduled tasks that write into them.
    pub(crate) fn take_images(&mut self) -> Vec<Image<f32, 1>> {
        std::mem::take(&mut self.images)
    }

    /// Store the stage images written outside of [`ConvolutionSequence::run`].
    pub(crate) fn set_images(&mut self, images: Vec<Image<f32, 1>>) {
        self.images = images;
        self.released = false;
    }
}

/// A fixed-width set of independent sequences reading the same input.
///
/// The sequences share no mutable state; they only read the common input and
/// write their own images, so they can run concurrently and finish in any order.
#[derive(Clone, Debug)]
pub struct ParallelConvolutionSequences {
    sequences: Vec<ConvolutionSequence>,
}

impl ParallelConvolutionSequences {
    /// Create the set.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::NoSequences`] if `sequences` is empty.
    pub fn new(sequences: Vec<ConvolutionSequence>) -> Result<Self, ConvolutionError> {
        if sequences.is_empty() {
            return Err(ConvolutionError::NoSequences);
        }
        Ok(Self { sequences })
    }

    /// Number of sequences.
    pub fn width(&self) -> usize {
        self.sequences.len()
    }

    /// The sequence at `index`.
    pub fn get(&self, index: usize) -> Option<&ConvolutionSequence> {
        self.sequences.get(index)
    }

    /// Iterate over the sequences.
    pub fn iter(&self) -> std::slice::Iter<'_, ConvolutionSequence> {
        self.sequences.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, ConvolutionSequence> {
        self.sequences.iter_mut()
    }

    /// The first convolution of the first sequence.
    pub fn first_convolution(&self) -> &Convolution {
        self.sequences[0].first()
    }

    /// Output size of every sequence for an input of size `input`.
    pub fn output_sizes(&self, input: ImageSize) -> Result<Vec<ImageSize>, ConvolutionError> {
        self.sequences
            .iter()
            .map(|seq| seq.output_size(input))
            .collect()
    }

    /// Run every sequence on `input`, concurrently.
    pub fn run<A: ImageAllocator>(
        &mut self,
        input: &Image<f32, 1, A>,
    ) -> Result<(), ConvolutionError> {
        self.sequences
            .par_iter_mut()
            .try_for_each(|seq| seq.run(input).map(|_| ()))
    }

    /// Release the images of every sequence.
    pub fn release(&mut self) {
        self.sequences
            .iter_mut()
            .for_each(ConvolutionSequence::release);
    }
}

impl<'a> IntoIterator for &'a ParallelConvolutionSequences {
    type Item = &'a ConvolutionSequence;
    type IntoIter = std::slice::Iter<'a, ConvolutionSequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sequences.iter()
    }
}
