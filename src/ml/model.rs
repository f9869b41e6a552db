use burn::{
    config::Config,
    module::Module,
    nn::{
        Linear, LinearConfig,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{
        Tensor,
        activation::{log_softmax, relu, softmax},
        backend::Backend,
    },
};
use thiserror::Error;

use crate::dataset::IMAGE_SIDE;

/// The configured architecture cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("{0} must be greater than zero")]
    ZeroSized(&'static str),
    #[error("kernel {kernel}x{kernel} does not fit a {input}x{input} input")]
    KernelTooLarge { kernel: usize, input: usize },
    #[error("pooling {pool}x{pool} collapses the {size}x{size} feature map")]
    PoolTooLarge { pool: usize, size: usize },
}

/// Architecture hyperparameters of [`FashionCnn`].
#[derive(Config, Debug, PartialEq)]
pub struct ModelConfig {
    #[config(default = 64)]
    pub filters: usize,
    #[config(default = 3)]
    pub kernel_size: usize,
    #[config(default = 2)]
    pub pool_size: usize,
    #[config(default = "vec![80, 40, 20]")]
    pub hidden: Vec<usize>,
    #[config(default = 10)]
    pub num_classes: usize,
}

impl ModelConfig {
    /// Side of the feature map after the valid convolution and the pooling.
    fn pooled_side(&self) -> usize {
        (IMAGE_SIDE + 1 - self.kernel_size) / self.pool_size
    }

    fn flattened_len(&self) -> usize {
        self.filters * self.pooled_side() * self.pooled_side()
    }

    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.filters == 0 {
            return Err(ConstructionError::ZeroSized("filter count"));
        }
        if self.kernel_size == 0 {
            return Err(ConstructionError::ZeroSized("kernel size"));
        }
        if self.pool_size == 0 {
            return Err(ConstructionError::ZeroSized("pool size"));
        }
        if self.num_classes == 0 {
            return Err(ConstructionError::ZeroSized("class count"));
        }
        if self.hidden.contains(&0) {
            return Err(ConstructionError::ZeroSized("hidden width"));
        }
        if self.kernel_size > IMAGE_SIDE {
            return Err(ConstructionError::KernelTooLarge {
                kernel: self.kernel_size,
                input: IMAGE_SIDE,
            });
        }
        if self.pooled_side() == 0 {
            return Err(ConstructionError::PoolTooLarge {
                pool: self.pool_size,
                size: IMAGE_SIDE + 1 - self.kernel_size,
            });
        }
        Ok(())
    }

    /// Build the network with freshly initialized weights.
    pub fn build<B: Backend>(&self, device: &B::Device) -> Result<FashionCnn<B>, ConstructionError> {
        self.validate()?;
        let conv = Conv2dConfig::new([1, self.filters], [self.kernel_size, self.kernel_size])
            .init(device);
        let pool = MaxPool2dConfig::new([self.pool_size, self.pool_size])
            .with_strides([self.pool_size, self.pool_size])
            .init();

        let mut widths = Vec::with_capacity(self.hidden.len() + 2);
        widths.push(self.flattened_len());
        widths.extend_from_slice(&self.hidden);
        widths.push(self.num_classes);
        let (hidden, output) = {
            let mut layers: Vec<Linear<B>> = widths
                .windows(2)
                .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
                .collect();
            let output = layers.pop().ok_or(ConstructionError::ZeroSized("dense stack"))?;
            (layers, output)
        };

        tracing::debug!(
            "Built classifier: conv {}x{}x{}, pool {}, dense {:?}",
            self.filters,
            self.kernel_size,
            self.kernel_size,
            self.pool_size,
            &widths[1..]
        );
        Ok(FashionCnn {
            conv,
            pool,
            hidden,
            output,
        })
    }
}

/// conv → max-pool → flatten → relu dense stack → softmax classifier.
#[derive(Module, Debug)]
pub struct FashionCnn<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> FashionCnn<B> {
    /// Unnormalized class scores for `[N, 28, 28, 1]` images.
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // Channels-last input, channels-first convolution.
        let x = images.permute([0, 3, 1, 2]);
        let x = relu(self.conv.forward(x));
        let x = self.pool.forward(x);
        let mut x: Tensor<B, 2> = x.flatten(1, 3);
        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }
        self.output.forward(x)
    }

    /// Class probabilities (`[N, classes]`, rows sum to one).
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(images), 1)
    }

    /// Mean categorical cross-entropy against one-hot `targets`.
    pub fn loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let per_row = (log_softmax(logits, 1) * targets).sum_dim(1).neg();
        per_row.mean()
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

/// Architecture used throughout the app.
pub fn build_default_model<B: Backend>(
    device: &B::Device,
) -> Result<FashionCnn<B>, ConstructionError> {
    ModelConfig::new().build(device)
}
