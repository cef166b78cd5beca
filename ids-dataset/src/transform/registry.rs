use super::*;
use crate::{common::*, config::TransformConfig};

type Constructor = fn(&TransformConfig) -> Result<TransformKind>;

static REGISTRY: Lazy<HashMap<&'static str, Constructor>> = Lazy::new(|| {
    let entries: [(&'static str, Constructor); 10] = [
        ("crop", crop),
        ("minresize", min_resize),
        ("resizecrop", resize_crop),
        ("horizontalflip", horizontal_flip),
        ("rotation", rotation),
        ("colorjitter", color_jitter),
        ("alexnetcolor", alexnet_color),
        ("mean", mean),
        ("channelwisescaleshift", channelwise_scale_shift),
        ("ignorevalue", ignore_value),
    ];
    entries.into_iter().collect()
});

/// Builds the transform named by `config.kind`, ignoring case.
pub fn create_transform(config: &TransformConfig) -> Result<TransformKind> {
    let key = config.kind.to_lowercase();
    let constructor = REGISTRY.get(key.as_str()).ok_or_else(|| {
        format_err!(
            "unknown transform type '{}', expect one of {}",
            config.kind,
            transform_types().join(", ")
        )
    })?;
    constructor(config).with_context(|| format!("invalid '{}' transform", config.kind))
}

/// Registered transform type names in lowercase.
pub fn transform_types() -> Vec<&'static str> {
    REGISTRY.keys().copied().sorted().collect()
}

fn required<'a, T>(param: &'a Option<T>, name: &str) -> Result<&'a T> {
    param
        .as_ref()
        .ok_or_else(|| format_err!("the field '{}' is required", name))
}

fn crop(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.crop_param, "crop_param")?;
    Ok(TransformKind::Crop(Crop::new(param)?))
}

fn min_resize(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.min_resize_param, "min_resize_param")?;
    Ok(TransformKind::MinResize(MinResize::new(param)?))
}

fn resize_crop(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.resize_crop_param, "resize_crop_param")?;
    Ok(TransformKind::ResizeCrop(ResizeCrop::new(param)?))
}

fn horizontal_flip(config: &TransformConfig) -> Result<TransformKind> {
    let param = config.horizontal_flip_param.clone().unwrap_or_default();
    Ok(TransformKind::HorizontalFlip(HorizontalFlip::new(&param)?))
}

fn rotation(_config: &TransformConfig) -> Result<TransformKind> {
    Ok(TransformKind::Rotation(Rotation))
}

fn color_jitter(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.color_jitter_param, "color_jitter_param")?;
    Ok(TransformKind::ColorJitter(ColorJitter::new(param)?))
}

fn alexnet_color(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.alexnet_color_param, "alexnet_color_param")?;
    Ok(TransformKind::AlexNetColor(AlexNetColor::new(param)?))
}

fn mean(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.mean_param, "mean_param")?;
    Ok(TransformKind::Mean(Mean::new(param)?))
}

fn channelwise_scale_shift(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(
        &config.channelwise_scale_shift_param,
        "channelwise_scale_shift_param",
    )?;
    Ok(TransformKind::ChannelwiseScaleShift(
        ChannelwiseScaleShift::new(param)?,
    ))
}

fn ignore_value(config: &TransformConfig) -> Result<TransformKind> {
    let param = required(&config.ignore_value_param, "ignore_value_param")?;
    Ok(TransformKind::IgnoreValue(IgnoreValue::new(
        param,
        &config.targets,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinResizeParam;

    #[test]
    fn lookup_ignores_case() -> Result<()> {
        let mut config = TransformConfig::new("MinResize", ["image"]);
        config.min_resize_param = Some(MinResizeParam { min_size: 8 });
        assert!(matches!(create_transform(&config)?, TransformKind::MinResize(_)));

        config.kind = "ROTATION".into();
        assert!(matches!(create_transform(&config)?, TransformKind::Rotation(_)));
        Ok(())
    }

    #[test]
    fn unknown_type_and_missing_param() {
        assert!(create_transform(&TransformConfig::new("blur", ["image"])).is_err());
        assert!(create_transform(&TransformConfig::new("crop", ["image"])).is_err());
        assert_eq!(transform_types().len(), 10);
    }
}
