use std::sync::Arc;

use approx::assert_relative_eq;
use vision_union_image::{CpuAllocator, Image, ImageSize};
use vision_union_imgproc::color::{gray_from_rgb, LuminanceWeights};
use vision_union_imgproc::filter::{
    kernels, Convolution, ConvolutionSequence, ParallelConvolutionSequences,
};
use vision_union_imgproc::padding::{self, ConvolutionPadMode};
use vision_union_imgproc::pipeline::{
    ConvolutionPipeline, PipelineConfig, PipelineError, PipelineState,
};
use vision_union_imgproc::scheduling::Scheduler;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SIZE_5X5: ImageSize = ImageSize {
    width: 5,
    height: 5,
};

#[test]
fn sobel_magnitude_of_constant_image() {
    init_logger();

    let mut pipeline = ConvolutionPipeline::sobel(SIZE_5X5, PipelineConfig::default()).unwrap();
    assert_eq!(pipeline.padding(), padding::Padding::uniform(1));

    let input = Image::<f32, 1, _>::from_size_val(SIZE_5X5, 1.0, CpuAllocator).unwrap();
    let handle = pipeline.schedule(input).unwrap();

    // nothing is readable until the run is completed
    assert_eq!(pipeline.output().err(), Some(PipelineError::NotComplete));
    assert_eq!(
        pipeline.sequence_output(0).err(),
        Some(PipelineError::NotComplete)
    );

    handle.complete();
    assert!(handle.is_complete());
    pipeline.complete().unwrap();

    // the zero border turns the edges of a constant image into gradients
    let c = 18f32.sqrt();
    #[rustfmt::skip]
    let expected = [
        c,   4.0, 4.0, 4.0, c,
        4.0, 0.0, 0.0, 0.0, 4.0,
        4.0, 0.0, 0.0, 0.0, 4.0,
        4.0, 0.0, 0.0, 0.0, 4.0,
        c,   4.0, 4.0, 4.0, c,
    ];
    let output = pipeline.output().unwrap();
    assert_eq!(output.size(), SIZE_5X5);
    for (v, e) in output.as_slice().iter().zip(expected.iter()) {
        assert_relative_eq!(*v, *e, epsilon = 1e-5);
    }

    // both sequence outputs are fully written
    let gx = pipeline.sequence_output(0).unwrap();
    let gy = pipeline.sequence_output(1).unwrap();
    assert_eq!(&gx.as_slice()[..5], &[3.0, 0.0, 0.0, 0.0, -3.0]);
    assert_eq!(&gy.as_slice()[..5], &[3.0, 4.0, 4.0, 4.0, 3.0]);
}

#[test]
fn vertical_step_edge() {
    init_logger();

    let size = ImageSize {
        width: 6,
        height: 4,
    };
    let data = (0..size.area())
        .map(|i| if i % size.width < 3 { 0.0 } else { 1.0 })
        .collect();
    let input = Image::<f32, 1, _>::new(size, data, CpuAllocator).unwrap();

    // no border: only windows fully inside the input are evaluated
    let config = PipelineConfig::default().with_pad_mode(ConvolutionPadMode::Valid);
    let mut pipeline = ConvolutionPipeline::sobel(size, config).unwrap();
    let output = pipeline.run(input).unwrap();

    assert_eq!(output.size(), ImageSize { width: 4, height: 2 });
    assert_eq!(output.as_slice(), &[0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 4.0, 0.0]);
}

#[test]
fn repeated_runs_give_identical_results() {
    init_logger();

    let size = ImageSize {
        width: 17,
        height: 11,
    };
    let data = (0..size.area()).map(|i| ((i * 31) % 7) as f32).collect();
    let input = Arc::new(Image::<f32, 1, _>::new(size, data, CpuAllocator).unwrap());

    let config = PipelineConfig::default()
        .with_combine_chunk_size(16)
        .with_num_threads(3);
    let mut pipeline = ConvolutionPipeline::sobel(size, config).unwrap();

    let first = pipeline.run(Arc::clone(&input)).unwrap().as_slice().to_vec();
    for _ in 0..5 {
        let handle = pipeline.schedule(Arc::clone(&input)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Scheduled);
        assert_eq!(
            pipeline.schedule(Arc::clone(&input)).err(),
            Some(PipelineError::AlreadyScheduled)
        );
        handle.complete();
        pipeline.complete().unwrap();
        assert_eq!(pipeline.output().unwrap().as_slice(), first.as_slice());
    }
}

#[test]
fn pipelines_share_a_scheduler() {
    init_logger();

    let scheduler = Scheduler::with_threads(2).unwrap();
    let mut pipelines = (0..3)
        .map(|_| {
            ConvolutionPipeline::sobel(SIZE_5X5, PipelineConfig::default())
                .unwrap()
                .with_scheduler(scheduler.clone())
        })
        .collect::<Vec<_>>();

    let handles = pipelines
        .iter_mut()
        .enumerate()
        .map(|(i, pipeline)| {
            let input =
                Image::<f32, 1, _>::from_size_val(SIZE_5X5, i as f32, CpuAllocator).unwrap();
            pipeline.schedule(input).unwrap()
        })
        .collect::<Vec<_>>();
    for handle in &handles {
        handle.complete();
    }

    for (i, pipeline) in pipelines.iter_mut().enumerate() {
        pipeline.complete().unwrap();
        // the corner gradient scales with the constant value
        let corner = pipeline.output().unwrap().as_slice()[0];
        assert_relative_eq!(corner, i as f32 * 18f32.sqrt(), epsilon = 1e-5);
    }
}

#[test]
fn grayscale_input_through_pipeline() {
    init_logger();

    let rgb = Image::<f32, 3, _>::from_size_val(SIZE_5X5, 2.0, CpuAllocator).unwrap();
    let mut gray = Image::<f32, 1, _>::from_size_val(SIZE_5X5, 0.0, CpuAllocator).unwrap();
    gray_from_rgb(&rgb, &mut gray, &LuminanceWeights::REC709).unwrap();

    let sequences = ParallelConvolutionSequences::new(vec![
        ConvolutionSequence::single(Convolution::unit(kernels::box_kernel(3, 3).unwrap())),
        ConvolutionSequence::single(Convolution::unit(kernels::box_kernel(3, 3).unwrap())),
    ])
    .unwrap();
    let config = PipelineConfig::default().with_pad_value(2.0);
    let mut pipeline =
        ConvolutionPipeline::new(SIZE_5X5, sequences, |a: f32, b: f32| a - b, config).unwrap();

    let output = pipeline.run(gray).unwrap();
    for v in output.as_slice() {
        assert_relative_eq!(*v, 0.0, epsilon = 1e-5);
    }
    for v in pipeline.padded_input().unwrap().as_slice() {
        assert_relative_eq!(*v, 2.0, epsilon = 1e-5);
    }
}

#[test]
fn runs_inside_global_pool_workers_on_a_dedicated_pool() {
    use rayon::prelude::*;

    init_logger();

    // the pipelines block on their own pool, never on the global one
    let corners = (0..4)
        .into_par_iter()
        .map(|i| {
            let config = PipelineConfig::default().with_num_threads(1);
            let mut pipeline = ConvolutionPipeline::sobel(SIZE_5X5, config).unwrap();
            let input =
                Image::<f32, 1, _>::from_size_val(SIZE_5X5, i as f32, CpuAllocator).unwrap();
            pipeline.run(input).unwrap().as_slice()[0]
        })
        .collect::<Vec<_>>();

    for (i, corner) in corners.iter().enumerate() {
        assert_relative_eq!(*corner, i as f32 * 18f32.sqrt(), epsilon = 1e-5);
    }
}

#[test]
fn single_pixel_input_in_same_mode() {
    init_logger();

    let size = ImageSize {
        width: 1,
        height: 1,
    };
    let mut pipeline = ConvolutionPipeline::sobel(size, PipelineConfig::default()).unwrap();
    assert_eq!(pipeline.output_size(), size);

    let input = Image::<f32, 1, _>::from_size_val(size, 1.0, CpuAllocator).unwrap();
    let output = pipeline.run(input).unwrap();
    assert_eq!(output.size(), size);
    assert_eq!(pipeline.padded_input().unwrap().size(), ImageSize { width: 3, height: 3 });
}
