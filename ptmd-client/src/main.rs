//! PTMD命令行客户端主程序

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ptmd_admin::{
    register_medico, AdminConsole, ClientConfig, PasswordForm, SessionContext, SessionStore,
};
use ptmd_core::{Consultation, Diagnosis, RegisterRequest, Role, Sex};
use ptmd_integration::ApiClient;
use ptmd_workflow::{current_selection, read_image_file, MedicoWorkflow, MAX_IMAGES};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// PTMD客户端命令行参数
#[derive(Parser, Debug)]
#[command(name = "ptmd-client")]
#[command(about = "PTMD 耳镜影像分诊系统命令行客户端", version)]
struct Args {
    /// 配置文件路径（默认读取当前目录的 ptmd.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 登录并保存会话
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// 登出并清除会话
    Logout,
    /// 显示当前用户
    Whoami,
    /// 医生注册
    Register {
        #[arg(long)]
        nome: String,
        #[arg(long)]
        cpf: String,
        #[arg(long)]
        crm: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// 出生日期 YYYY-MM-DD
        #[arg(long)]
        nascimento: Option<NaiveDate>,
    },
    /// 列出会诊，可按患者姓名/CPF筛选
    List {
        #[arg(long)]
        nome: Option<String>,
        #[arg(long)]
        cpf: Option<String>,
    },
    /// 显示会诊详情
    Show { id: i64 },
    /// 创建会诊并上传影像（png/jpg/jpeg，最多10张）
    Create {
        #[arg(long)]
        nome: String,
        #[arg(long)]
        cpf: String,
        #[arg(long, default_value = "MASCULINO", value_parser = parse_sex)]
        sexo: Sex,
        /// 出生日期 YYYY-MM-DD
        #[arg(long)]
        nascimento: Option<NaiveDate>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 确认一张影像的诊断，未给出诊断时使用当前预选值
    Confirm {
        #[arg(long)]
        consultation: i64,
        #[arg(long)]
        image: i64,
        #[arg(long)]
        diagnosis: Option<Diagnosis>,
    },
    /// 确认旧版单影像会诊
    ConfirmConsultation { id: i64, diagnosis: Diagnosis },
    /// 下载影像，加载失败时写出占位图
    Image {
        file_path: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// 管理员仪表盘
    Dashboard,
    /// 下载数据库备份
    Backup {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// 修改管理员密码
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    /// 写出当前生效的配置
    ConfigInit { path: PathBuf },
}

fn parse_sex(value: &str) -> std::result::Result<Sex, String> {
    Sex::parse(value).ok_or_else(|| format!("invalid sexo '{}', expected MASCULINO, FEMININO or OUTRO", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClientConfig::load(args.config.as_deref())?;

    // 初始化日志
    let log_level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(&log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("PTMD client using {}", config.api.base_url);

    if let Err(e) = run(args.command, config).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, config: ClientConfig) -> Result<()> {
    if let Command::ConfigInit { path } = &command {
        config.save(path).await?;
        println!("Configuração gravada em {}", path.display());
        return Ok(());
    }

    let client = ApiClient::new(
        &config.api.base_url,
        config.api.request_timeout(),
        config.api.connect_timeout(),
    )?;
    let mut session = SessionContext::init(SessionStore::new(&config.session.storage_path))
        .await
        .context("Failed to restore session")?;
    client.set_token(session.token().map(str::to_string));

    match command {
        Command::Login { email, password } => {
            let user = session.login(&client, &email, &password).await?;
            println!("Logado como {} ({})", user.email, user.role.as_str());
        }
        Command::Logout => {
            session.teardown().await?;
            println!("Sessão encerrada");
        }
        Command::Whoami => match session.user() {
            Some(user) => println!("{} ({})", user.email, user.role.as_str()),
            None => println!("Não autenticado"),
        },
        Command::Register { nome, cpf, crm, email, password, nascimento } => {
            let request = RegisterRequest {
                nome,
                cpf,
                crm,
                data_nascimento: nascimento,
                email,
                password,
            };
            register_medico(&client, &request).await?;
            println!("Cadastro realizado com sucesso");
        }
        Command::Dashboard | Command::Backup { .. } | Command::ChangePassword { .. } => {
            session.require(Role::Admin)?;
            run_admin(command, Arc::new(client), &config).await?;
        }
        _ => {
            session.require(Role::Medico)?;
            run_medico(command, Arc::new(client)).await?;
        }
    }
    Ok(())
}

async fn run_medico(command: Command, api: Arc<ApiClient>) -> Result<()> {
    let workflow = MedicoWorkflow::new(Arc::clone(&api));

    match command {
        Command::List { nome, cpf } => {
            workflow
                .apply_filter(nome.as_deref().unwrap_or_default(), cpf.as_deref().unwrap_or_default())
                .await?;
            let rows = workflow.rows().await;
            if rows.is_empty() {
                println!("Nenhuma consulta encontrada");
            }
            for row in rows {
                println!(
                    "#{:<5} {:<30} {:<14} {:<16} {:<14} {}",
                    row.id, row.patient_name, row.patient_cpf, row.created_at, row.image_count, row.status_label
                );
            }
        }
        Command::Show { id } => {
            let consultation = workflow.open_detail(id).await?;
            print_consultation(&consultation);
        }
        Command::Create { nome, cpf, sexo, nascimento, files } => {
            if files.len() > MAX_IMAGES {
                warn!("Only the first {} of {} files will be uploaded", MAX_IMAGES, files.len());
            }
            let mut images = Vec::with_capacity(files.len());
            for path in &files {
                images.push(read_image_file(path).await?);
            }

            let outcome = workflow.add_files(images).await;
            if outcome.rejected > 0 {
                println!("{} arquivo(s) ignorado(s): máximo de {} imagens", outcome.rejected, MAX_IMAGES);
            }
            workflow
                .edit_draft(|draft| {
                    draft.patient_name = nome;
                    draft.patient_cpf = cpf;
                    draft.patient_sex = sexo;
                    draft.patient_birth_date = nascimento;
                })
                .await;

            let consultation = workflow.submit_draft().await?;
            println!("Consulta #{} criada", consultation.id);
            print_consultation(&consultation);
        }
        Command::Confirm { consultation, image, diagnosis } => {
            workflow.open_detail(consultation).await?;
            let updated = match diagnosis {
                Some(diagnosis) => workflow.confirm_image(image, diagnosis).await?,
                None => workflow.confirm_with_suggestion(image).await?,
            };
            println!(
                "Imagem #{} confirmada: {}",
                updated.id,
                updated
                    .final_diagnosis
                    .as_deref()
                    .and_then(Diagnosis::from_code)
                    .map(|d| d.label())
                    .unwrap_or("-")
            );
            if let Some(row) = workflow.rows().await.into_iter().find(|r| r.id == consultation) {
                println!("Consulta #{}: {}", row.id, row.status_label);
            } else if let Some(selected) = workflow.selected().await {
                print_consultation(&selected);
            }
        }
        Command::ConfirmConsultation { id, diagnosis } => {
            let updated = workflow.confirm_consultation(id, diagnosis).await?;
            println!("Consulta #{} confirmada: {}", updated.id, diagnosis.label());
        }
        Command::Image { file_path, out } => {
            let preview = api.load_image_preview(&file_path).await;
            if preview.is_placeholder() {
                println!("Imagem não carregada, gravando placeholder");
            }
            tokio::fs::write(&out, preview.bytes())
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("{} ({}) -> {}", file_path, preview.content_type(), out.display());
        }
        other => anyhow::bail!("unsupported medico command: {:?}", other),
    }
    Ok(())
}

async fn run_admin(command: Command, api: Arc<ApiClient>, config: &ClientConfig) -> Result<()> {
    let console = AdminConsole::new(api);

    match command {
        Command::Dashboard => {
            let counts = console.load_dashboard().await?;
            println!("Total de imagens:   {}", counts.total_images);
            println!("Total de consultas: {}", counts.total_consultations);
            println!("Total de pacientes: {}", counts.total_patients);
        }
        Command::Backup { out_dir } => {
            let output_dir = out_dir.unwrap_or_else(|| config.backup.output_dir.clone());
            let receipt = console.download_backup(&output_dir).await?;
            println!("Backup gravado em {}", receipt.path.display());
            println!("  tamanho: {} bytes", receipt.size_bytes);
            println!("  sha256:  {}", receipt.sha256);
        }
        Command::ChangePassword { current, new, confirm } => {
            console.open_password_dialog().await;
            console
                .set_password_form(PasswordForm {
                    current_password: current,
                    new_password: new,
                    confirm_password: confirm,
                })
                .await;
            let _auto_close = console.submit_password_change().await?;
            println!("Senha alterada com sucesso!");
        }
        other => anyhow::bail!("unsupported admin command: {:?}", other),
    }
    Ok(())
}

fn print_consultation(consultation: &Consultation) {
    let patient = &consultation.patient;
    println!("Consulta #{}", consultation.id);
    println!(
        "  Paciente: {} | CPF: {} | Sexo: {}",
        patient.name,
        patient.cpf.as_deref().unwrap_or("-"),
        patient.sex.map(|s| s.as_str()).unwrap_or("-")
    );
    if let Some(birth_date) = patient.birth_date {
        println!("  Nascimento: {}", birth_date.format("%d/%m/%Y"));
    }

    if consultation.images.is_empty() && !consultation.legacy.is_empty() {
        let legacy = &consultation.legacy;
        println!(
            "  Diagnóstico IA: {} | Final: {} | Confirmado: {}",
            legacy.ai_diagnosis.as_deref().unwrap_or("-"),
            legacy.final_diagnosis.as_deref().unwrap_or("-"),
            if legacy.confirmed { "sim" } else { "não" }
        );
    }

    for image in &consultation.images {
        let ai = image
            .ai_diagnosis
            .as_deref()
            .map(|raw| Diagnosis::normalize(raw).label())
            .unwrap_or("-");
        let status = if image.confirmed {
            format!(
                "confirmada: {}",
                image
                    .final_diagnosis
                    .as_deref()
                    .map(|raw| Diagnosis::normalize(raw).label())
                    .unwrap_or("-")
            )
        } else {
            format!("pendente (sugestão: {})", current_selection(image).label())
        };
        println!(
            "  Imagem #{} {} | IA: {} {} | {}",
            image.id,
            image.file_name,
            ai,
            image.confidence_percent().unwrap_or_default(),
            status
        );
    }
}
