use crate::hyperparams::HyperParameters;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Env passthroughs and MCA tuning for NCCL over EFA.
pub const DEFAULT_MPI_OPTIONS: &str = "-x FI_EFA_USE_DEVICE_RDMA=1 -x FI_PROVIDER=efa -x RDMAV_FORK_SAFE=1 \
-x NCCL_DEBUG=INFO -x NCCL_TREE_THRESHOLD=0 -x HOROVOD_CYCLE_TIME=0.5 -x HOROVOD_FUSION_THRESHOLD=67108864 \
--mca btl_vader_single_copy_mechanism none";

/// How worker processes are launched across hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStrategy {
    /// The service starts `mpirun` on the leader host.
    #[default]
    Mpi,
    /// The service's native data-parallel all-reduce library.
    DataParallel,
}

/// Distribution descriptor: one worker per GPU on every host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub strategy: DistributionStrategy,
    pub processes_per_host: u32,
    pub host_count: u32,
    pub custom_mpi_options: String,
}

impl DistributionSpec {
    #[must_use]
    pub fn total_processes(&self) -> u64 {
        u64::from(self.processes_per_host) * u64::from(self.host_count)
    }

    /// Keys the framework container reads to set up the launcher.
    #[must_use]
    pub fn framework_hyperparameters(&self, instance_type: &str) -> HyperParameters {
        let mut out = HyperParameters::new();
        match self.strategy {
            DistributionStrategy::Mpi => {
                out.insert("sagemaker_mpi_enabled".to_string(), json!(true));
                out.insert("sagemaker_mpi_num_of_processes_per_host".to_string(), json!(self.processes_per_host));
                out.insert("sagemaker_mpi_custom_mpi_options".to_string(), json!(self.custom_mpi_options));
            }
            DistributionStrategy::DataParallel => {
                out.insert("sagemaker_distributed_dataparallel_enabled".to_string(), json!(true));
                out.insert(
                    "sagemaker_distributed_dataparallel_custom_mpi_options".to_string(),
                    json!(self.custom_mpi_options),
                );
                out.insert("sagemaker_instance_type".to_string(), json!(instance_type));
            }
        }
        out
    }
}

/// MPI-launched descriptor with the default communication tuning.
#[must_use]
pub fn build_distribution_descriptor(workers_per_host: u32, host_count: u32) -> DistributionSpec {
    DistributionSpec {
        strategy: DistributionStrategy::Mpi,
        processes_per_host: workers_per_host,
        host_count,
        custom_mpi_options: DEFAULT_MPI_OPTIONS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpi_descriptor() {
        let spec = build_distribution_descriptor(8, 4);
        assert_eq!(spec.strategy, DistributionStrategy::Mpi);
        assert_eq!(spec.total_processes(), 32);

        let hp = spec.framework_hyperparameters("ml.p3dn.24xlarge");
        assert_eq!(hp["sagemaker_mpi_enabled"], json!(true));
        assert_eq!(hp["sagemaker_mpi_num_of_processes_per_host"], json!(8));
        assert!(hp["sagemaker_mpi_custom_mpi_options"].as_str().unwrap().contains("FI_PROVIDER=efa"));
        assert!(!hp.contains_key("sagemaker_instance_type"));
    }

    #[test]
    fn test_data_parallel_keys() {
        let spec = DistributionSpec {
            strategy: DistributionStrategy::DataParallel,
            custom_mpi_options: String::new(),
            ..build_distribution_descriptor(8, 2)
        };
        let hp = spec.framework_hyperparameters("ml.p4d.24xlarge");
        assert_eq!(hp["sagemaker_distributed_dataparallel_enabled"], json!(true));
        assert_eq!(hp["sagemaker_instance_type"], json!("ml.p4d.24xlarge"));
        assert!(!hp.contains_key("sagemaker_mpi_enabled"));
    }
}
