use async_trait::async_trait;

/// Best-effort local data lookup fallback for `needs_data=true`. The
/// domain sensor/feeder/image endpoints themselves are out of scope here —
/// this is just the hook a complete pipeline wires them through.
#[async_trait]
pub trait DataLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Option<String>;
}

/// Default implementation when no data source is wired in.
pub struct NullDataLookup;

#[async_trait]
impl DataLookup for NullDataLookup {
    async fn lookup(&self, _query: &str) -> Option<String> {
        None
    }
}

/// Hook for the device-control branch. The feeder/actuator endpoints are
/// out of scope here; this trait is the seam a concrete integration would
/// implement, mirroring [`DataLookup`]'s null-object default.
#[async_trait]
pub trait DeviceActuator: Send + Sync {
    async fn execute(&self, query: &str) -> Option<String>;
}

pub struct NullDeviceActuator;

#[async_trait]
impl DeviceActuator for NullDeviceActuator {
    async fn execute(&self, _query: &str) -> Option<String> {
        None
    }
}

/// Hook for the optional weather context merge ahead of synthesis. The
/// weather lookup itself is out of scope here.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Option<String>;
}

pub struct NullWeatherLookup;

#[async_trait]
impl WeatherLookup for NullWeatherLookup {
    async fn lookup(&self, _query: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_data_lookup_always_returns_none() {
        assert!(NullDataLookup.lookup("ph level").await.is_none());
    }

    #[tokio::test]
    async fn null_device_actuator_always_returns_none() {
        assert!(NullDeviceActuator.execute("turn off feeder").await.is_none());
    }

    #[tokio::test]
    async fn null_weather_lookup_always_returns_none() {
        assert!(NullWeatherLookup.lookup("pond 3").await.is_none());
    }
}
