use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameters as forwarded to the training entry point, keyed by name.
pub type HyperParameters = BTreeMap<String, serde_json::Value>;

/// Upper bound on worker processes per host (largest GPU instances carry 16).
pub const MAX_GPUS_PER_HOST: u32 = 16;

/// Learning-rate decay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Piecewise-constant step decay.
    #[default]
    Step,
    /// Cosine decay with warm restarts.
    Cosine,
}

/// Every option the Faster R-CNN training entry point reads from its
/// hyperparameter mapping.
///
/// Unknown keys are rejected when deserializing, and `validate` enforces the
/// numeric ranges before anything is sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfiguration {
    pub schedule: Schedule,
    /// Mixed (reduced) precision when true.
    pub fp16: bool,
    pub base_learning_rate: f64,
    pub warmup_steps: u32,
    /// Initial learning rate during warmup, as a fraction of the base rate.
    pub warmup_init_lr_scale: f64,
    pub batch_size_per_device: u32,
    /// Worker processes per host, one per GPU.
    pub gpus_per_host: u32,
    /// Number of hosts.
    pub instance_count: u32,
    pub use_conv: bool,
    pub use_rcnn_bn: bool,
    /// Label smoothing factor.
    pub ls: f64,
}

impl Default for TrainingConfiguration {
    fn default() -> Self {
        Self {
            schedule: Schedule::Step,
            fp16: true,
            base_learning_rate: 0.01,
            warmup_steps: 500,
            warmup_init_lr_scale: 0.3333,
            batch_size_per_device: 4,
            gpus_per_host: 8,
            instance_count: 4,
            use_conv: true,
            use_rcnn_bn: false,
            ls: 0.0,
        }
    }
}

impl TrainingConfiguration {
    pub fn validate(&self) -> LaunchResult<()> {
        if !self.base_learning_rate.is_finite() || self.base_learning_rate <= 0.0 {
            return Err(invalid("base_learning_rate must be > 0"));
        }
        if self.warmup_steps == 0 {
            return Err(invalid("warmup_steps must be >= 1"));
        }
        if !self.warmup_init_lr_scale.is_finite()
            || self.warmup_init_lr_scale <= 0.0
            || self.warmup_init_lr_scale > 1.0
        {
            return Err(invalid("warmup_init_lr_scale must be in (0, 1]"));
        }
        if self.batch_size_per_device == 0 {
            return Err(invalid("batch_size_per_device must be >= 1"));
        }
        if self.gpus_per_host == 0 || self.gpus_per_host > MAX_GPUS_PER_HOST {
            return Err(invalid(&format!("gpus_per_host must be in 1..={MAX_GPUS_PER_HOST}")));
        }
        if self.instance_count == 0 {
            return Err(invalid("instance_count must be >= 1"));
        }
        if !self.ls.is_finite() || !(0.0..1.0).contains(&self.ls) {
            return Err(invalid("ls (label smoothing) must be in [0, 1)"));
        }
        Ok(())
    }

    /// Images processed per optimizer step across the whole job.
    pub fn global_batch_size(&self) -> u64 {
        u64::from(self.batch_size_per_device)
            * u64::from(self.gpus_per_host)
            * u64::from(self.instance_count)
    }

    /// The configuration as a flat name -> value mapping. Field names are the keys.
    pub fn to_hyperparameters(&self) -> LaunchResult<HyperParameters> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(LaunchError::InvalidConfig(format!(
                "hyperparameters serialized to a non-object: {other}"
            ))),
        }
    }
}

fn invalid(msg: &str) -> LaunchError {
    LaunchError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        let cfg = TrainingConfiguration::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.global_batch_size(), 4 * 8 * 4);
    }

    #[test]
    fn test_label_smoothing_must_be_below_one() {
        let cfg = TrainingConfiguration { ls: 1.0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = TrainingConfiguration { ls: 0.1, ..Default::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_parallelism() {
        let cfg = TrainingConfiguration { gpus_per_host: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainingConfiguration { gpus_per_host: 17, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainingConfiguration { instance_count: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        let cfg = TrainingConfiguration { base_learning_rate: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = TrainingConfiguration { base_learning_rate: f64::NAN, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = toml::from_str::<TrainingConfiguration>("schedule = \"cosine\"\nlearning_rate = 0.1\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let cfg: TrainingConfiguration =
            toml::from_str("schedule = \"cosine\"\nfp16 = false\n").unwrap();
        assert_eq!(cfg.schedule, Schedule::Cosine);
        assert!(!cfg.fp16);
        assert_eq!(cfg.gpus_per_host, 8);
    }

    #[test]
    fn test_hyperparameter_keys_match_fields() {
        let map = TrainingConfiguration::default().to_hyperparameters().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "base_learning_rate",
                "batch_size_per_device",
                "fp16",
                "gpus_per_host",
                "instance_count",
                "ls",
                "schedule",
                "use_conv",
                "use_rcnn_bn",
                "warmup_init_lr_scale",
                "warmup_steps",
            ]
        );
        assert_eq!(map["schedule"], serde_json::json!("step"));
    }
}
