//! [`EcsComputeLauncher`]: the compute-launcher contract over `aws-sdk-ecs`,
//! one reasonable realization of "the Dispatcher does not care what a
//! worker physically is" (§6). Workers are Fargate tasks; `list_workers`
//! counts tasks by ECS's own desired-status bucketing, and `launch` asks
//! for a capacity-provider mix so most Workers land on preemptible
//! (Fargate Spot) capacity per `preemptible_weight`.

use async_trait::async_trait;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, CapacityProviderStrategyItem, DesiredStatus, NetworkConfiguration,
};
use aws_sdk_ecs::Client;

use crate::error::{MirrorError, Result};
use crate::model::WorkerCensus;
use crate::ports::ComputeLauncher;

pub struct EcsComputeLauncher {
    client: Client,
    cluster: String,
    task_definition: String,
    spot_provider: String,
    on_demand_provider: String,
    subnets: Vec<String>,
    security_groups: Vec<String>,
}

impl EcsComputeLauncher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        cluster: impl Into<String>,
        task_definition: impl Into<String>,
        spot_provider: impl Into<String>,
        on_demand_provider: impl Into<String>,
        subnets: Vec<String>,
        security_groups: Vec<String>,
    ) -> Self {
        Self {
            client,
            cluster: cluster.into(),
            task_definition: task_definition.into(),
            spot_provider: spot_provider.into(),
            on_demand_provider: on_demand_provider.into(),
            subnets,
            security_groups,
        }
    }

    fn network_configuration(&self) -> NetworkConfiguration {
        NetworkConfiguration::builder()
            .awsvpc_configuration(
                AwsVpcConfiguration::builder()
                    .set_subnets(Some(self.subnets.clone()))
                    .set_security_groups(Some(self.security_groups.clone()))
                    .assign_public_ip(AssignPublicIp::Disabled)
                    .build()
                    .expect("subnets is always non-empty at construction"),
            )
            .build()
    }

    async fn count_tasks(&self, status: DesiredStatus) -> Result<u32> {
        let resp = self
            .client
            .list_tasks()
            .cluster(&self.cluster)
            .family(&self.task_definition)
            .desired_status(status)
            .send()
            .await
            .map_err(|err| MirrorError::LaunchFailed(err.to_string()))?;
        Ok(resp.task_arns().len() as u32)
    }
}

#[async_trait]
impl ComputeLauncher for EcsComputeLauncher {
    async fn list_workers(&self) -> Result<WorkerCensus> {
        let running = self.count_tasks(DesiredStatus::Running).await?;
        let pending = self.count_tasks(DesiredStatus::Pending).await?;
        Ok(WorkerCensus { running, pending })
    }

    async fn launch(&self, preemptible_weight: (u32, u32), count: u32) -> Result<()> {
        let (preemptible, on_demand) = preemptible_weight;
        let strategy = vec![
            CapacityProviderStrategyItem::builder()
                .capacity_provider(&self.spot_provider)
                .weight(preemptible as i32)
                .build(),
            CapacityProviderStrategyItem::builder()
                .capacity_provider(&self.on_demand_provider)
                .weight(on_demand as i32)
                .build(),
        ];

        self.client
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .set_capacity_provider_strategy(Some(strategy))
            .network_configuration(self.network_configuration())
            .count(count as i32)
            .send()
            .await
            .map_err(|err| MirrorError::LaunchFailed(err.to_string()))?;
        Ok(())
    }
}
