//! 医生端会诊接口的HTTP实现

use crate::client::ApiClient;
use async_trait::async_trait;
use ptmd_core::utils::mask_cpf;
use ptmd_core::{
    Consultation, ConsultationApi, ConsultationCreateRequest, ConsultationQuery, Diagnosis, Image,
    PtmdError, Result, ValidationError,
};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{debug, info};

const CREATE_FALLBACK: &str = "Erro ao criar consulta";
const LIST_FALLBACK: &str = "Erro ao carregar consultas";
const DETAIL_FALLBACK: &str = "Erro ao carregar detalhes da consulta";
const CONFIRM_FALLBACK: &str = "Erro ao confirmar diagnóstico";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody<'a> {
    final_diagnosis: &'a str,
}

/// 构造创建会诊的multipart表单，影像按草稿顺序重复使用 `images` 字段
fn consultation_form(request: &ConsultationCreateRequest) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in request.text_fields() {
        form = form.text(name, value);
    }

    for image in &request.images {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(|_| ValidationError::UnsupportedImageType(image.file_name.clone()))?;
        form = form.part("images", part);
    }

    Ok(form)
}

#[async_trait]
impl ConsultationApi for ApiClient {
    async fn create_consultation(&self, request: &ConsultationCreateRequest) -> Result<Consultation> {
        info!(
            "Creating consultation for patient cpf={} with {} image(s)",
            mask_cpf(&request.patient.cpf),
            request.images.len()
        );
        let form = consultation_form(request)?;
        let consultation: Consultation = self
            .send_json(
                self.http().post(self.url("medico/consultations")).multipart(form),
                CREATE_FALLBACK,
            )
            .await?;

        info!("Consultation {} created", consultation.id);
        Ok(consultation)
    }

    async fn list_consultations(&self, query: &ConsultationQuery) -> Result<Vec<Consultation>> {
        let mut request = self.http().get(self.url("medico/consultations"));
        let params = query.to_params();
        if !params.is_empty() {
            request = request.query(&params);
        }

        let consultations: Vec<Consultation> = self.send_json(request, LIST_FALLBACK).await?;
        debug!("Fetched {} consultation(s)", consultations.len());
        Ok(consultations)
    }

    async fn get_consultation(&self, consultation_id: i64) -> Result<Consultation> {
        self.send_json(
            self.http().get(self.url(&format!("medico/consultations/{}", consultation_id))),
            DETAIL_FALLBACK,
        )
        .await
    }

    async fn confirm_image(&self, image_id: i64, diagnosis: Diagnosis) -> Result<Image> {
        info!("Confirming image {} as {}", image_id, diagnosis.code());
        let body = ConfirmBody {
            final_diagnosis: diagnosis.code(),
        };
        let image: Image = self
            .send_json(
                self.http()
                    .put(self.url(&format!("medico/consultations/images/{}/confirm", image_id)))
                    .json(&body),
                CONFIRM_FALLBACK,
            )
            .await?;

        if image.id != image_id {
            return Err(PtmdError::request(
                None,
                Some(format!("Resposta inesperada para a imagem {}", image_id)),
                CONFIRM_FALLBACK,
            ));
        }
        Ok(image)
    }

    async fn confirm_consultation(&self, consultation_id: i64, final_diagnosis: &str) -> Result<Consultation> {
        info!("Confirming legacy consultation {}", consultation_id);
        self.send_json(
            self.http()
                .put(self.url(&format!("medico/consultations/{}/confirm", consultation_id)))
                .json(&ConfirmBody { final_diagnosis }),
            CONFIRM_FALLBACK,
        )
        .await
    }
}
