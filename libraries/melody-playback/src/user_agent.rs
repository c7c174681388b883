//! User-agent stamping
//!
//! Every track handed to the engine carries the app's user agent so that
//! providers' CDNs see a consistent client.

/// Operating system family of the host device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePlatform {
    Android,
    Ios,
    Other,
}

/// Static facts about the device and app build
pub trait DeviceInfo: Send + Sync {
    fn app_name(&self) -> String;
    fn app_version(&self) -> String;
    fn platform(&self) -> DevicePlatform;
    fn os_version(&self) -> String;
    fn model(&self) -> String;
}

/// [`DeviceInfo`] with fixed values
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    /// Application name, first half of the app token
    pub app_name: String,
    /// Application version, second half of the app token
    pub app_version: String,
    pub platform: DevicePlatform,
    /// OS release, e.g. `14` or `17.4`
    pub os_version: String,
    /// Device model, used on Android only
    pub model: String,
}

impl StaticDeviceInfo {
    /// Generic desktop-style device for the given app
    pub fn app(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: name.into(),
            app_version: version.into(),
            platform: DevicePlatform::Other,
            os_version: String::new(),
            model: String::new(),
        }
    }
}

impl DeviceInfo for StaticDeviceInfo {
    fn app_name(&self) -> String {
        self.app_name.clone()
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }

    fn platform(&self) -> DevicePlatform {
        self.platform
    }

    fn os_version(&self) -> String {
        self.os_version.clone()
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

/// Render the user agent for the device
pub fn app_user_agent(device: &dyn DeviceInfo) -> String {
    let app = format!("{}/{}", device.app_name(), device.app_version());
    match device.platform() {
        DevicePlatform::Android => format!(
            "Mozilla/5.0 (Linux; Android {}; {}; rv:112.0) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36 {app}",
            device.os_version(),
            device.model(),
        ),
        DevicePlatform::Ios => format!(
            "Mozilla/5.0 (iPhone; CPU iPhone OS {} like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Mobile/15E148 {app}",
            device.os_version().replacen('.', "_", 1),
        ),
        DevicePlatform::Other => app,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(platform: DevicePlatform, os_version: &str) -> StaticDeviceInfo {
        StaticDeviceInfo {
            app_name: "Melody".to_string(),
            app_version: "1.2.0".to_string(),
            platform,
            os_version: os_version.to_string(),
            model: "Pixel 8".to_string(),
        }
    }

    #[test]
    fn android_agent() {
        let ua = app_user_agent(&device(DevicePlatform::Android, "14"));
        assert_eq!(
            ua,
            "Mozilla/5.0 (Linux; Android 14; Pixel 8; rv:112.0) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36 Melody/1.2.0"
        );
    }

    #[test]
    fn ios_agent_underscores_first_dot() {
        let ua = app_user_agent(&device(DevicePlatform::Ios, "17.4.1"));
        assert!(ua.starts_with("Mozilla/5.0 (iPhone; CPU iPhone OS 17_4.1 like Mac OS X)"));
        assert!(ua.ends_with("Mobile/15E148 Melody/1.2.0"));
    }

    #[test]
    fn generic_agent() {
        let ua = app_user_agent(&StaticDeviceInfo::app("Melody", "0.1.0"));
        assert_eq!(ua, "Melody/0.1.0");
    }
}
