use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{Cache, InMemoryCache};
use crate::config::ConfigProvider;
use crate::error::SourceError;
use crate::models::job::{Job, JobStatus};
use crate::models::vehicle::Vehicle;
use crate::models::GeoPoint;
use crate::observability::metrics::Metrics;
use crate::sources::{CargoSource, JobFilter, ResourceFilter, ResourceSource};

const JOB_LIST_PREFIX: &str = "jobs:";
const VEHICLE_LIST_PREFIX: &str = "vehicles:";

fn job_key(id: &str) -> String {
    format!("job:{id}")
}

fn vehicle_key(id: &str) -> String {
    format!("vehicle:{id}")
}

fn capacity_key(id: &str) -> String {
    format!("capacity:{id}")
}

/// Read-through TTL cache over a [`CargoSource`]. Status writes invalidate before returning.
pub struct CachedCargoSource {
    inner: Arc<dyn CargoSource>,
    lists: Arc<dyn Cache<Vec<Job>>>,
    items: Arc<dyn Cache<Job>>,
    config: Arc<ConfigProvider>,
    metrics: Metrics,
}

impl CachedCargoSource {
    pub fn new(inner: Arc<dyn CargoSource>, config: Arc<ConfigProvider>, metrics: Metrics) -> Self {
        Self::with_caches(
            inner,
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryCache::new()),
            config,
            metrics,
        )
    }

    pub fn with_caches(
        inner: Arc<dyn CargoSource>,
        lists: Arc<dyn Cache<Vec<Job>>>,
        items: Arc<dyn Cache<Job>>,
        config: Arc<ConfigProvider>,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner,
            lists,
            items,
            config,
            metrics,
        }
    }

    async fn invalidate_job(&self, id: &str) {
        self.items.invalidate(&job_key(id)).await;
        self.lists.invalidate_prefix(JOB_LIST_PREFIX).await;
        debug!(job_id = id, "job cache invalidated");
    }
}

#[async_trait]
impl CargoSource for CachedCargoSource {
    async fn list_open_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SourceError> {
        let key = filter.cache_key();
        if let Some(jobs) = self.lists.get(&key).await {
            self.metrics.record_cache_lookup("jobs", true);
            return Ok(jobs);
        }
        self.metrics.record_cache_lookup("jobs", false);

        let jobs = self.inner.list_open_jobs(filter).await?;
        self.lists
            .set(&key, jobs.clone(), self.config.get().cache_ttl.cargo)
            .await;
        Ok(jobs)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, SourceError> {
        let key = job_key(id);
        if let Some(job) = self.items.get(&key).await {
            self.metrics.record_cache_lookup("job", true);
            return Ok(Some(job));
        }
        self.metrics.record_cache_lookup("job", false);

        let job = self.inner.get_job(id).await?;
        if let Some(job) = &job {
            self.items
                .set(&key, job.clone(), self.config.get().cache_ttl.cargo)
                .await;
        }
        Ok(job)
    }

    async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<bool, SourceError> {
        let result = self.inner.set_job_status(id, status).await;
        self.invalidate_job(id).await;
        result
    }

    async fn transition_job_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, SourceError> {
        let result = self.inner.transition_job_status(id, from, to).await;
        self.invalidate_job(id).await;
        result
    }
}

/// Read-through TTL cache over a [`ResourceSource`]. Writes invalidate before returning.
pub struct CachedResourceSource {
    inner: Arc<dyn ResourceSource>,
    lists: Arc<dyn Cache<Vec<Vehicle>>>,
    items: Arc<dyn Cache<Vehicle>>,
    capacities: Arc<dyn Cache<Option<f64>>>,
    config: Arc<ConfigProvider>,
    metrics: Metrics,
}

impl CachedResourceSource {
    pub fn new(
        inner: Arc<dyn ResourceSource>,
        config: Arc<ConfigProvider>,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner,
            lists: Arc::new(InMemoryCache::new()),
            items: Arc::new(InMemoryCache::new()),
            capacities: Arc::new(InMemoryCache::new()),
            config,
            metrics,
        }
    }

    async fn invalidate_vehicle(&self, id: &str) {
        self.items.invalidate(&vehicle_key(id)).await;
        self.capacities.invalidate(&capacity_key(id)).await;
        self.lists.invalidate_prefix(VEHICLE_LIST_PREFIX).await;
        debug!(vehicle_id = id, "vehicle cache invalidated");
    }
}

#[async_trait]
impl ResourceSource for CachedResourceSource {
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Vehicle>, SourceError> {
        let key = filter.cache_key();
        if let Some(vehicles) = self.lists.get(&key).await {
            self.metrics.record_cache_lookup("vehicles", true);
            return Ok(vehicles);
        }
        self.metrics.record_cache_lookup("vehicles", false);

        let vehicles = self.inner.list_resources(filter).await?;
        self.lists
            .set(&key, vehicles.clone(), self.config.get().cache_ttl.resources)
            .await;
        Ok(vehicles)
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Vehicle>, SourceError> {
        let key = vehicle_key(id);
        if let Some(vehicle) = self.items.get(&key).await {
            self.metrics.record_cache_lookup("vehicle", true);
            return Ok(Some(vehicle));
        }
        self.metrics.record_cache_lookup("vehicle", false);

        let vehicle = self.inner.get_resource(id).await?;
        if let Some(vehicle) = &vehicle {
            self.items
                .set(&key, vehicle.clone(), self.config.get().cache_ttl.resources)
                .await;
        }
        Ok(vehicle)
    }

    async fn get_available_capacity(&self, id: &str) -> Result<Option<f64>, SourceError> {
        let key = capacity_key(id);
        if let Some(capacity) = self.capacities.get(&key).await {
            self.metrics.record_cache_lookup("capacity", true);
            return Ok(capacity);
        }
        self.metrics.record_cache_lookup("capacity", false);

        let capacity = self.inner.get_available_capacity(id).await?;
        self.capacities
            .set(&key, capacity, self.config.get().cache_ttl.resources)
            .await;
        Ok(capacity)
    }

    async fn update_position(&self, id: &str, position: GeoPoint) -> Result<bool, SourceError> {
        let result = self.inner.update_position(id, position).await;
        self.invalidate_vehicle(id).await;
        result
    }

    async fn assign_job(
        &self,
        id: &str,
        job_id: &str,
        weight_kg: f64,
    ) -> Result<bool, SourceError> {
        let result = self.inner.assign_job(id, job_id, weight_kg).await;
        self.invalidate_vehicle(id).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, Utc};

    use super::*;
    use crate::config::DispatchConfig;
    use crate::models::job::{PriceType, RoutePoint};
    use crate::models::vehicle::{VehicleStatus, VehicleType};
    use crate::sources::memory::{InMemoryCargoSource, InMemoryFleet};

    struct CountingSource {
        inner: InMemoryCargoSource,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl CargoSource for CountingSource {
        async fn list_open_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SourceError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_open_jobs(filter).await
        }

        async fn get_job(&self, id: &str) -> Result<Option<Job>, SourceError> {
            self.inner.get_job(id).await
        }

        async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<bool, SourceError> {
            self.inner.set_job_status(id, status).await
        }

        async fn transition_job_status(
            &self,
            id: &str,
            from: JobStatus,
            to: JobStatus,
        ) -> Result<bool, SourceError> {
            self.inner.transition_job_status(id, from, to).await
        }
    }

    struct CountingFleet {
        inner: InMemoryFleet,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ResourceSource for CountingFleet {
        async fn list_resources(
            &self,
            filter: &ResourceFilter,
        ) -> Result<Vec<Vehicle>, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_resources(filter).await
        }

        async fn get_resource(&self, id: &str) -> Result<Option<Vehicle>, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_resource(id).await
        }

        async fn get_available_capacity(&self, id: &str) -> Result<Option<f64>, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_available_capacity(id).await
        }

        async fn update_position(
            &self,
            id: &str,
            position: GeoPoint,
        ) -> Result<bool, SourceError> {
            self.inner.update_position(id, position).await
        }

        async fn assign_job(
            &self,
            id: &str,
            job_id: &str,
            weight_kg: f64,
        ) -> Result<bool, SourceError> {
            self.inner.assign_job(id, job_id, weight_kg).await
        }
    }

    fn truck(id: &str) -> Vehicle {
        Vehicle {
            id: id.to_string(),
            license_plate: format!("B-{id}"),
            driver_name: "Mihai".to_string(),
            vehicle_type: VehicleType::Truck,
            max_capacity_kg: 10_000.0,
            fuel_consumption_l_per_100km: 9.0,
            status: VehicleStatus::Idle,
            position: Some(GeoPoint { lat: 44.4, lng: 26.1 }),
            gps_enabled: true,
        }
    }

    fn cached_fleet() -> (Arc<CountingFleet>, CachedResourceSource) {
        let inner = InMemoryFleet::new();
        inner.insert_tracked(truck("v1"), 0.0).unwrap();
        let source = Arc::new(CountingFleet {
            inner,
            reads: AtomicUsize::new(0),
        });
        let config = Arc::new(ConfigProvider::new(DispatchConfig::default()).unwrap());
        let cache = CachedResourceSource::new(source.clone(), config, Metrics::new());
        (source, cache)
    }

    fn job(id: &str) -> Job {
        let now = Utc::now();
        Job {
            id: id.to_string(),
            origin: RoutePoint {
                city: "Bucharest".to_string(),
                country: "RO".to_string(),
                location: None,
                postal_code: None,
            },
            destination: RoutePoint {
                city: "Constanta".to_string(),
                country: "RO".to_string(),
                location: None,
                postal_code: None,
            },
            weight_kg: 1_000.0,
            volume_m3: None,
            cargo_type: "Food".to_string(),
            price: 600.0,
            price_type: PriceType::Fixed,
            loading_date: now,
            delivery_date: now + Duration::hours(40),
            deadline: None,
            special_requirements: Vec::new(),
            status: JobStatus::Active,
        }
    }

    fn cached(source: Arc<CountingSource>) -> CachedCargoSource {
        let config = Arc::new(ConfigProvider::new(DispatchConfig::default()).unwrap());
        CachedCargoSource::new(source, config, Metrics::new())
    }

    #[tokio::test]
    async fn second_listing_is_served_from_cache() {
        let source = Arc::new(CountingSource {
            inner: InMemoryCargoSource::with_jobs([job("a")]).unwrap(),
            list_calls: AtomicUsize::new(0),
        });
        let cache = cached(source.clone());

        cache.list_open_jobs(&JobFilter::open()).await.unwrap();
        cache.list_open_jobs(&JobFilter::open()).await.unwrap();

        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_write_invalidates_before_next_read() {
        let source = Arc::new(CountingSource {
            inner: InMemoryCargoSource::with_jobs([job("a"), job("b")]).unwrap(),
            list_calls: AtomicUsize::new(0),
        });
        let cache = cached(source.clone());

        assert_eq!(cache.list_open_jobs(&JobFilter::open()).await.unwrap().len(), 2);
        assert!(cache.get_job("a").await.unwrap().is_some());

        assert!(cache.set_job_status("a", JobStatus::Assigned).await.unwrap());

        let open = cache.list_open_jobs(&JobFilter::open()).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "b");
        assert_eq!(
            cache.get_job("a").await.unwrap().map(|j| j.status),
            Some(JobStatus::Assigned)
        );
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_job_is_not_cached() {
        let source = Arc::new(CountingSource {
            inner: InMemoryCargoSource::new(),
            list_calls: AtomicUsize::new(0),
        });
        let cache = cached(source.clone());

        assert!(cache.get_job("ghost").await.unwrap().is_none());
        source.inner.insert(job("ghost")).unwrap();
        assert!(cache.get_job("ghost").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transition_invalidates_cached_job() {
        let source = Arc::new(CountingSource {
            inner: InMemoryCargoSource::with_jobs([job("a")]).unwrap(),
            list_calls: AtomicUsize::new(0),
        });
        let cache = cached(source.clone());
        assert!(cache.get_job("a").await.unwrap().is_some());

        assert!(
            cache
                .transition_job_status("a", JobStatus::Active, JobStatus::Assigned)
                .await
                .unwrap()
        );
        assert!(
            !cache
                .transition_job_status("a", JobStatus::Active, JobStatus::Assigned)
                .await
                .unwrap()
        );
        assert_eq!(
            cache.get_job("a").await.unwrap().map(|j| j.status),
            Some(JobStatus::Assigned)
        );
    }

    #[tokio::test]
    async fn vehicle_reads_are_served_from_cache() {
        let (source, cache) = cached_fleet();

        cache.get_resource("v1").await.unwrap();
        cache.get_available_capacity("v1").await.unwrap();
        cache.list_available().await.unwrap();
        let warm = source.reads.load(Ordering::SeqCst);

        cache.get_resource("v1").await.unwrap();
        cache.get_available_capacity("v1").await.unwrap();
        cache.list_available().await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), warm);
    }

    #[tokio::test]
    async fn position_update_invalidates_vehicle_and_lists() {
        let (_source, cache) = cached_fleet();
        cache.get_resource("v1").await.unwrap();
        cache.list_available().await.unwrap();

        let moved = GeoPoint { lat: 45.6, lng: 25.6 };
        assert!(cache.update_position("v1", moved).await.unwrap());

        let vehicle = cache.get_resource("v1").await.unwrap().unwrap();
        assert_eq!(vehicle.position, Some(moved));
        let listed = cache.list_available().await.unwrap();
        assert_eq!(listed[0].position, Some(moved));
    }

    #[tokio::test]
    async fn assignment_invalidates_capacity_and_status() {
        let (_source, cache) = cached_fleet();
        assert_eq!(cache.get_available_capacity("v1").await.unwrap(), Some(10_000.0));
        assert_eq!(
            cache.get_resource("v1").await.unwrap().map(|v| v.status),
            Some(VehicleStatus::Idle)
        );
        cache.list_available().await.unwrap();

        assert!(cache.assign_job("v1", "j1", 4_000.0).await.unwrap());

        assert_eq!(cache.get_available_capacity("v1").await.unwrap(), Some(6_000.0));
        assert_eq!(
            cache.get_resource("v1").await.unwrap().map(|v| v.status),
            Some(VehicleStatus::Assigned)
        );
        let listed = cache.list_available().await.unwrap();
        assert_eq!(listed[0].status, VehicleStatus::Assigned);
    }
}
