use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use clap::{Arg, ArgAction, Command};
use dorn_depth::{Dorn, DornConfig, Layers};
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::init();

    let matches = Command::new("dorn_inspect")
        .version("0.1.0")
        .about("DORN 모델 구성 확인 도구")
        .arg(
            Arg::new("preset")
                .long("preset")
                .short('p')
                .value_name("NAME")
                .help("설정 프리셋 (kitti, nyu, tiny)")
                .default_value("kitti"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("JSON 설정 파일 (프리셋 대신 사용)"),
        )
        .arg(
            Arg::new("pretrained")
                .long("pretrained")
                .value_name("FILE")
                .help("torchvision 이름 규칙의 safetensors 백본 가중치"),
        )
        .arg(
            Arg::new("no-freeze")
                .long("no-freeze")
                .help("BatchNorm 통계를 고정하지 않음")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("forward")
                .long("forward")
                .help("0 입력으로 forward 한 번 실행")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("❌ {:#}", e);
        process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => DornConfig::from_json_file(path)?,
        None => DornConfig::preset(matches.get_one::<String>("preset").map(String::as_str).unwrap_or("kitti"))?,
    };
    if let Some(path) = matches.get_one::<String>("pretrained") {
        config.pretrained = Some(PathBuf::from(path));
    }
    if matches.get_flag("no-freeze") {
        config.freeze_norm = false;
    }

    let device = Device::Cpu;
    let model = Dorn::new(&config, &device)?;

    println!("📐 입력: {} x {:?}", config.input_channels, config.input_size);
    println!("📐 특징맵: {} x {:?}", config.backbone.feature_channels(), config.context.feature_size);
    println!("📐 출력: ord_num={} ({} 채널), {:?}", config.ord_num, config.ordinal_channels(), config.output_size);
    println!("🔢 전체 파라미터: {}", model.parameter_count());
    for group in model.param_groups(1e-4) {
        println!(
            "   {:<8} lr={:.0e} tensors={} scalars={}",
            group.name,
            group.lr,
            group.vars.len(),
            group.elem_count()
        );
    }
    let trainable = model.trainable_parameters().count();
    println!("   학습 가능 텐서 {} / 전체 {}", trainable, model.parameters().count());

    if matches.get_flag("forward") {
        let (h, w) = config.input_size;
        let input = Tensor::zeros((1, config.input_channels, h, w), DType::F32, &device)?;
        let out = model.forward(&input)?;
        let decoded = out.decoded.flatten_all()?.to_vec1::<f32>()?;
        let max = decoded.iter().cloned().fold(f32::MIN, f32::max);
        let min = decoded.iter().cloned().fold(f32::MAX, f32::min);
        println!("✅ decoded {:?}, 범위 [{:.4}, {:.4}]", out.decoded.dims(), min, max);
        println!("✅ probabilities {:?}", out.probabilities.dims());
    }
    Ok(())
}
