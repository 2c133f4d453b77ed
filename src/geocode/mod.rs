use serde::Deserialize;

use crate::config::Config;
use crate::geo::GeoPoint;

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    display_name: Option<String>,
}

/// 坐标的降级文本，地理编码不可用时作为地址返回
pub fn coordinate_text(point: GeoPoint) -> String {
    format!("{:.6}, {:.6}", point.latitude, point.longitude)
}

/// 反向地理编码：坐标换可读地址。
/// 未配置、超时或任何失败都降级为坐标文本，绝不阻塞告警创建。
pub async fn address_for(config: &Config, point: GeoPoint) -> String {
    let Some(base_url) = config.geocode_url.as_deref() else {
        tracing::warn!("Geocoding service not configured, returning coordinates as address");
        return coordinate_text(point);
    };

    let lookup = async {
        let client = reqwest::Client::new();
        let resp = client
            .get(format!("{}/reverse", base_url.trim_end_matches('/')))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ReverseGeocodeResponse>()
            .await?;
        Ok::<_, reqwest::Error>(resp.display_name)
    };

    match tokio::time::timeout(config.geocode_timeout(), lookup).await {
        Ok(Ok(Some(address))) if !address.is_empty() => address,
        Ok(Ok(_)) => coordinate_text(point),
        Ok(Err(e)) => {
            tracing::error!("Failed to get address from coordinates: {}", e);
            coordinate_text(point)
        }
        Err(_) => {
            tracing::warn!("Geocoding timed out after {:?}", config.geocode_timeout());
            coordinate_text(point)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_text_uses_six_decimals() {
        let p = GeoPoint::new(12.9716, 77.5946).unwrap();
        assert_eq!(coordinate_text(p), "12.971600, 77.594600");
    }
}
