use crate::core::error::DornError;
use crate::core::layers::ConvSpec;
use crate::depth::backbone::{dorn_repairs, Repair, RepairSite, ResNetBackbone};
use crate::depth::config::{BackboneConfig, DornConfig};
use anyhow::Result;
use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn block_spec(backbone: &ResNetBackbone, stage: usize, site: RepairSite) -> ConvSpec {
    let block = &backbone.stages()[stage - 1].blocks[0];
    match site {
        RepairSite::Conv1 => *block.conv1.spec(),
        RepairSite::Conv2 => *block.conv2.spec(),
        RepairSite::ShortcutConv => *block.downsample.as_ref().expect("shortcut").conv.spec(),
    }
}

#[test]
fn resnet101_교체_목록() {
    let repairs = dorn_repairs(&BackboneConfig::default());
    let shapes: Vec<(usize, RepairSite, usize, usize, usize)> = repairs
        .iter()
        .map(|r| (r.stage, r.site, r.spec.in_channels, r.spec.out_channels, r.spec.kernel))
        .collect();
    assert_eq!(
        shapes,
        vec![
            (1, RepairSite::Conv1, 128, 64, 1),
            (1, RepairSite::ShortcutConv, 128, 256, 1),
            (3, RepairSite::Conv2, 256, 256, 3),
            (3, RepairSite::ShortcutConv, 512, 1024, 1),
            (4, RepairSite::Conv2, 512, 512, 3),
            (4, RepairSite::ShortcutConv, 1024, 2048, 1),
        ]
    );
    assert!(repairs.iter().all(|r| r.block == 0 && r.spec.stride == 1 && !r.spec.bias));
    assert_eq!(repairs[2].target(), "layer3.0.conv2");
    assert_eq!(repairs[5].target(), "layer4.0.downsample.0");
}

#[test]
fn 교체가_적용된_백본() -> Result<()> {
    let config = DornConfig::tiny();
    let mut rng = StdRng::seed_from_u64(0);
    let backbone = ResNetBackbone::new(&config, &mut rng, &Device::Cpu)?;
    for repair in dorn_repairs(&config.backbone) {
        assert_eq!(block_spec(&backbone, repair.stage, repair.site), repair.spec);
    }
    // stage 2 는 stride 2 유지
    assert_eq!(block_spec(&backbone, 2, RepairSite::Conv2).stride, 2);
    let conv1 = &backbone.stages()[0].blocks[0].conv1;
    assert_eq!(conv1.name(), "layer1.0.conv1");
    assert_eq!(conv1.weight().dims(), &[2, 8, 1, 1]);
    Ok(())
}

#[test]
fn 출력_채널이_다른_교체는_거부() -> Result<()> {
    let config = DornConfig::tiny();
    let mut rng = StdRng::seed_from_u64(0);
    let device = Device::Cpu;
    let mut backbone = ResNetBackbone::new(&config, &mut rng, &device)?;

    let wrong = Repair {
        stage: 3,
        block: 0,
        site: RepairSite::Conv2,
        spec: ConvSpec::new(8, 9, 3).padding(1).no_bias(),
    };
    let err = backbone
        .repair_pretrained_submodule(&wrong, &mut rng, &device)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DornError>(),
        Some(DornError::ShapeMismatch { .. })
    ));
    // 원래 합성곱은 그대로
    assert_eq!(block_spec(&backbone, 3, RepairSite::Conv2).out_channels, 8);
    Ok(())
}

#[test]
fn 없는_위치의_교체는_거부() -> Result<()> {
    let mut config = DornConfig::tiny();
    config.backbone.blocks = [2, 1, 1, 1];
    let mut rng = StdRng::seed_from_u64(0);
    let device = Device::Cpu;
    let mut backbone = ResNetBackbone::new(&config, &mut rng, &device)?;

    let spec = ConvSpec::new(8, 8, 1).no_bias();
    let cases = [
        Repair { stage: 1, block: 1, site: RepairSite::ShortcutConv, spec },
        Repair { stage: 5, block: 0, site: RepairSite::Conv1, spec },
        Repair { stage: 0, block: 0, site: RepairSite::Conv1, spec },
        Repair { stage: 2, block: 3, site: RepairSite::Conv1, spec },
    ];
    for repair in cases {
        let err = backbone
            .repair_pretrained_submodule(&repair, &mut rng, &device)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DornError>(),
            Some(DornError::InvalidConfig(_))
        ));
    }
    Ok(())
}
