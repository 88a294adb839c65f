//! 医生工作流引擎
//!
//! 协调会诊看板、筛选条件、上传草稿和确认操作。状态只根据服务端响应更新；
//! 同一时间最多一个创建请求、每张影像或旧版会诊最多一个确认请求在途。

use crate::confirmation::{current_selection, ConfirmationStateMachine, ImageEvent, ImageState};
use crate::draft::{AddFilesOutcome, UploadDraft};
use crate::worklist::{ConsultationBoard, ConsultationFilter, ConsultationRow};
use ptmd_core::{Consultation, ConsultationApi, Diagnosis, Image, ImageFile, PtmdError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

const LIST_FALLBACK: &str = "Erro ao carregar consultas";

/// 工作流可见状态
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub board: ConsultationBoard,
    pub filter: ConsultationFilter,
    pub draft: UploadDraft,
    /// 草稿表单内的校验提示，不进入错误横幅
    pub validation_error: Option<String>,
    /// 可关闭的错误横幅
    pub error: Option<String>,
}

/// 在途标记，离开作用域时释放
struct UploadGuard<'a>(&'a AtomicBool);

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ConfirmGuard<'a> {
    in_flight: &'a Mutex<HashSet<i64>>,
    id: i64,
}

impl<'a> ConfirmGuard<'a> {
    /// 登记在途id，已在途时返回 `None`
    fn acquire(in_flight: &'a Mutex<HashSet<i64>>, id: i64) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(id).then(|| ConfirmGuard { in_flight, id })
    }
}

impl Drop for ConfirmGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.id);
    }
}

/// 医生工作流引擎
pub struct MedicoWorkflow<A: ConsultationApi> {
    api: Arc<A>,
    state: RwLock<WorkflowState>,
    state_machine: ConfirmationStateMachine,
    uploading: AtomicBool,
    confirming: Mutex<HashSet<i64>>,
    confirming_consultations: Mutex<HashSet<i64>>,
}

impl<A: ConsultationApi> MedicoWorkflow<A> {
    /// 创建新的工作流引擎
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: RwLock::new(WorkflowState::default()),
            state_machine: ConfirmationStateMachine::new(),
            uploading: AtomicBool::new(false),
            confirming: Mutex::new(HashSet::new()),
            confirming_consultations: Mutex::new(HashSet::new()),
        }
    }

    /// 当前状态快照
    pub async fn snapshot(&self) -> WorkflowState {
        self.state.read().await.clone()
    }

    pub async fn rows(&self) -> Vec<ConsultationRow> {
        self.state.read().await.board.rows()
    }

    pub async fn selected(&self) -> Option<Consultation> {
        self.state.read().await.board.selected().cloned()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn dismiss_error(&self) {
        self.state.write().await.error = None;
    }

    pub async fn validation_error(&self) -> Option<String> {
        self.state.read().await.validation_error.clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    async fn fail(&self, err: PtmdError) -> PtmdError {
        tracing::warn!("Workflow operation failed: {}", err);
        self.state.write().await.error = Some(err.banner_message());
        err
    }

    // =========================================================================
    // 列表与筛选
    // =========================================================================

    /// 按当前筛选条件重新加载列表
    pub async fn load_consultations(&self) -> Result<usize> {
        let query = self.state.read().await.filter.to_query();
        tracing::info!("Loading consultations (filtered: {})", !query.is_unfiltered());

        match self.api.list_consultations(&query).await {
            Ok(consultations) => {
                let count = consultations.len();
                self.state.write().await.board.replace_all(consultations);
                Ok(count)
            }
            Err(err) => {
                // 列表加载失败时统一显示固定文案
                tracing::warn!("Failed to load consultations: {}", err);
                self.state.write().await.error = Some(LIST_FALLBACK.to_string());
                Err(err)
            }
        }
    }

    /// 设置筛选条件并重新查询，过滤由服务端完成
    pub async fn apply_filter(&self, name: &str, cpf: &str) -> Result<usize> {
        self.state.write().await.filter = ConsultationFilter::new(name, cpf);
        self.load_consultations().await
    }

    /// 清空筛选条件并重新查询全部
    pub async fn clear_filters(&self) -> Result<usize> {
        self.state.write().await.filter.clear();
        self.load_consultations().await
    }

    // =========================================================================
    // 详情
    // =========================================================================

    /// 打开会诊详情
    pub async fn open_detail(&self, consultation_id: i64) -> Result<Consultation> {
        self.dismiss_error().await;
        match self.api.get_consultation(consultation_id).await {
            Ok(consultation) => {
                tracing::info!(
                    "Opened consultation {} with {} image(s)",
                    consultation.id,
                    consultation.images.len()
                );
                self.state.write().await.board.select(consultation.clone());
                Ok(consultation)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn close_detail(&self) {
        self.state.write().await.board.close_detail();
    }

    // =========================================================================
    // 上传草稿
    // =========================================================================

    pub async fn add_files(&self, files: Vec<ImageFile>) -> AddFilesOutcome {
        self.state.write().await.draft.add_files(files)
    }

    pub async fn remove_file(&self, index: usize) -> Option<ImageFile> {
        self.state.write().await.draft.remove_file(index)
    }

    /// 修改草稿中的患者字段
    pub async fn edit_draft<F>(&self, edit: F)
    where
        F: FnOnce(&mut UploadDraft),
    {
        edit(&mut self.state.write().await.draft);
    }

    /// 提交草稿；成功后会诊插入列表头部并清空草稿
    pub async fn submit_draft(&self) -> Result<Consultation> {
        let request = {
            let mut state = self.state.write().await;
            match state.draft.build() {
                Ok(request) => {
                    state.validation_error = None;
                    request
                }
                Err(validation) => {
                    tracing::debug!("Draft rejected: {}", validation);
                    state.validation_error = Some(validation.to_string());
                    return Err(validation.into());
                }
            }
        };

        if self
            .uploading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PtmdError::Busy("consultation upload already in progress".to_string()));
        }
        let _guard = UploadGuard(&self.uploading);

        self.dismiss_error().await;
        tracing::info!(
            "Submitting consultation with {} image(s)",
            request.images.len()
        );

        match self.api.create_consultation(&request).await {
            Ok(consultation) => {
                let mut state = self.state.write().await;
                state.board.prepend(consultation.clone());
                state.draft.reset();
                tracing::info!("Created consultation {}", consultation.id);
                Ok(consultation)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    // =========================================================================
    // 诊断确认
    // =========================================================================

    /// 详情中某张影像当前应预选的诊断
    pub async fn suggested_diagnosis(&self, image_id: i64) -> Result<Diagnosis> {
        let state = self.state.read().await;
        let image = Self::find_selected_image(&state, image_id)?;
        Ok(current_selection(image))
    }

    fn find_selected_image(state: &WorkflowState, image_id: i64) -> Result<&Image> {
        state
            .board
            .selected()
            .and_then(|c| c.image(image_id))
            .ok_or_else(|| PtmdError::NotFound(format!("Image {} is not in the open consultation", image_id)))
    }

    /// 确认详情中一张影像的诊断
    pub async fn confirm_image(&self, image_id: i64, diagnosis: Diagnosis) -> Result<Image> {
        let consultation_id = {
            let state = self.state.read().await;
            let image = Self::find_selected_image(&state, image_id)?;
            // 已确认的影像不再提供确认操作
            self.state_machine
                .transition(ImageState::of(image), ImageEvent::Confirm)?;
            state.board.selected().map(|c| c.id).unwrap_or_default()
        };

        let _guard = ConfirmGuard::acquire(&self.confirming, image_id)
            .ok_or_else(|| PtmdError::Busy(format!("image {} is already being confirmed", image_id)))?;

        tracing::info!(
            "Confirming image {} of consultation {} as {}",
            image_id,
            consultation_id,
            diagnosis.code()
        );

        match self.api.confirm_image(image_id, diagnosis).await {
            Ok(updated) => {
                let mut state = self.state.write().await;
                state.board.apply_image(consultation_id, updated.clone())?;
                Ok(updated)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// 以当前预选诊断确认
    pub async fn confirm_with_suggestion(&self, image_id: i64) -> Result<Image> {
        let diagnosis = self.suggested_diagnosis(image_id).await?;
        self.confirm_image(image_id, diagnosis).await
    }

    /// 确认旧版单影像会诊
    pub async fn confirm_consultation(&self, consultation_id: i64, diagnosis: Diagnosis) -> Result<Consultation> {
        let _guard = ConfirmGuard::acquire(&self.confirming_consultations, consultation_id).ok_or_else(|| {
            PtmdError::Busy(format!("consultation {} is already being confirmed", consultation_id))
        })?;

        tracing::info!(
            "Confirming consultation {} as {}",
            consultation_id,
            diagnosis.code()
        );
        match self.api.confirm_consultation(consultation_id, diagnosis.code()).await {
            Ok(updated) => {
                self.state.write().await.board.apply_consultation(updated.clone());
                Ok(updated)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::confirm;
    use crate::confirmation::tests::{consultation, image};
    use crate::draft::tests::file;
    use async_trait::async_trait;
    use ptmd_core::{ConsultationCreateRequest, ConsultationQuery, ValidationError};
    use tokio::sync::Notify;

    /// 内存中的后端替身
    #[derive(Default)]
    struct FakeApi {
        consultations: Mutex<Vec<Consultation>>,
        queries: Mutex<Vec<ConsultationQuery>>,
        created: Mutex<Vec<ConsultationCreateRequest>>,
        gate: Option<Arc<Notify>>,
        confirm_gate: Option<Arc<Notify>>,
        fail_confirm: AtomicBool,
    }

    impl FakeApi {
        fn with(consultations: Vec<Consultation>) -> Self {
            Self {
                consultations: Mutex::new(consultations),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ConsultationApi for FakeApi {
        async fn create_consultation(&self, request: &ConsultationCreateRequest) -> Result<Consultation> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.created.lock().unwrap().push(request.clone());
            let images = request
                .images
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let mut img = image(500 + i as i64, Some("aom"), None, false);
                    img.file_name = f.file_name.clone();
                    img
                })
                .collect();
            let mut created = consultation(50, images);
            created.patient.name = request.patient.name.clone();
            Ok(created)
        }

        async fn list_consultations(&self, query: &ConsultationQuery) -> Result<Vec<Consultation>> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.consultations.lock().unwrap().clone())
        }

        async fn get_consultation(&self, consultation_id: i64) -> Result<Consultation> {
            self.consultations
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == consultation_id)
                .cloned()
                .ok_or_else(|| {
                    PtmdError::request(Some(400), Some("Consulta não encontrada".into()), "Erro")
                })
        }

        async fn confirm_image(&self, image_id: i64, diagnosis: Diagnosis) -> Result<Image> {
            if self.fail_confirm.load(Ordering::SeqCst) {
                return Err(PtmdError::request(Some(500), None, "Erro ao confirmar diagnóstico"));
            }
            let consultations = self.consultations.lock().unwrap();
            let img = consultations
                .iter()
                .flat_map(|c| c.images.iter())
                .find(|i| i.id == image_id)
                .ok_or_else(|| PtmdError::NotFound(format!("image {}", image_id)))?;
            Ok(confirm(img, diagnosis))
        }

        async fn confirm_consultation(&self, consultation_id: i64, final_diagnosis: &str) -> Result<Consultation> {
            if let Some(gate) = &self.confirm_gate {
                gate.notified().await;
            }
            let mut updated = self.get_consultation(consultation_id).await?;
            updated.legacy.final_diagnosis = Some(final_diagnosis.to_string());
            updated.legacy.confirmed = true;
            Ok(updated)
        }
    }

    fn sample() -> Vec<Consultation> {
        vec![
            consultation(1, vec![image(10, Some("csom"), None, false), image(11, Some("aom"), None, false)]),
            consultation(2, vec![image(20, None, None, true)]),
        ]
    }

    #[tokio::test]
    async fn test_load_and_filter() {
        let api = Arc::new(FakeApi::with(sample()));
        let workflow = MedicoWorkflow::new(api.clone());

        assert_eq!(workflow.load_consultations().await.unwrap(), 2);
        workflow.apply_filter("  Ana ", "   ").await.unwrap();
        workflow.clear_filters().await.unwrap();

        let queries = api.queries.lock().unwrap().clone();
        assert!(queries[0].is_unfiltered());
        assert_eq!(queries[1].name.as_deref(), Some("Ana"));
        assert_eq!(queries[1].cpf, None);
        assert!(queries[2].is_unfiltered());

        let rows = workflow.rows().await;
        assert_eq!(rows[0].status_label, "0/2 confirmadas");
        assert_eq!(rows[1].status_label, "Todas confirmadas");
    }

    #[tokio::test]
    async fn test_submit_draft_prepends_and_resets() {
        let api = Arc::new(FakeApi::with(sample()));
        let workflow = MedicoWorkflow::new(api.clone());
        workflow.load_consultations().await.unwrap();

        workflow
            .edit_draft(|d| {
                d.patient_name = "Ana".into();
                d.patient_cpf = "123".into();
            })
            .await;
        workflow.add_files(vec![file("f1.png"), file("f2.png")]).await;

        let created = workflow.submit_draft().await.unwrap();
        assert_eq!(created.id, 50);

        let state = workflow.snapshot().await;
        let ids: Vec<i64> = state.board.consultations().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![50, 1, 2]);
        assert_eq!(state.draft, UploadDraft::new());
        assert!(state.error.is_none());
        assert_eq!(api.created.lock().unwrap()[0].images.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_invalid_draft_never_calls_api() {
        let api = Arc::new(FakeApi::default());
        let workflow = MedicoWorkflow::new(api.clone());
        workflow.edit_draft(|d| d.patient_name = "Ana".into()).await;

        let err = workflow.submit_draft().await.unwrap_err();
        assert!(matches!(err, PtmdError::Validation(ValidationError::MissingImages)));
        assert!(api.created.lock().unwrap().is_empty());
        assert_eq!(
            workflow.validation_error().await.as_deref(),
            Some("Por favor, selecione pelo menos uma imagem")
        );
        // 校验提示只显示在表单内
        assert!(workflow.error().await.is_none());

        workflow.edit_draft(|d| d.patient_cpf = "123".into()).await;
        workflow.add_files(vec![file("f1.png")]).await;
        workflow.submit_draft().await.unwrap();
        assert!(workflow.validation_error().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_draft_keeps_existing_banner() {
        let workflow = MedicoWorkflow::new(Arc::new(FakeApi::with(sample())));
        workflow.open_detail(99).await.unwrap_err();

        workflow.submit_draft().await.unwrap_err();
        assert_eq!(workflow.error().await.as_deref(), Some("Consulta não encontrada"));
        assert!(workflow.validation_error().await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let workflow = MedicoWorkflow::new(api.clone());
        workflow
            .edit_draft(|d| {
                d.patient_name = "Ana".into();
                d.patient_cpf = "123".into();
            })
            .await;
        workflow.add_files(vec![file("f1.png")]).await;

        let (first, second, _) = tokio::join!(workflow.submit_draft(), workflow.submit_draft(), async {
            gate.notify_one();
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(PtmdError::Busy(_))));
        assert!(!workflow.is_uploading());
        assert_eq!(api.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_image_updates_detail_and_list() {
        let api = Arc::new(FakeApi::with(sample()));
        let workflow = MedicoWorkflow::new(api);
        workflow.load_consultations().await.unwrap();
        workflow.open_detail(1).await.unwrap();

        assert_eq!(workflow.suggested_diagnosis(10).await.unwrap(), Diagnosis::Csom);
        let updated = workflow.confirm_with_suggestion(10).await.unwrap();
        assert_eq!(updated.final_diagnosis.as_deref(), Some("csom"));

        let selected = workflow.selected().await.unwrap();
        assert!(selected.images[0].confirmed);
        assert!(!selected.images[1].confirmed);
        assert_eq!(workflow.rows().await[0].status_label, "1/2 confirmadas");

        // 已确认的影像不能再次确认
        let again = workflow.confirm_image(10, Diagnosis::Aom).await;
        assert!(matches!(again, Err(PtmdError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_failed_confirmation_leaves_state_unchanged() {
        let api = Arc::new(FakeApi::with(sample()));
        api.fail_confirm.store(true, Ordering::SeqCst);
        let workflow = MedicoWorkflow::new(api.clone());
        workflow.load_consultations().await.unwrap();
        workflow.open_detail(1).await.unwrap();
        let before = workflow.snapshot().await;

        let err = workflow.confirm_image(11, Diagnosis::Aom).await.unwrap_err();
        assert_eq!(err.banner_message(), "Erro ao confirmar diagnóstico");

        let after = workflow.snapshot().await;
        assert_eq!(after.board.selected(), before.board.selected());
        assert_eq!(after.error.as_deref(), Some("Erro ao confirmar diagnóstico"));

        // 失败后可以手动重试
        api.fail_confirm.store(false, Ordering::SeqCst);
        assert!(workflow.confirm_image(11, Diagnosis::Aom).await.is_ok());
    }

    #[tokio::test]
    async fn test_open_detail_error_sets_banner() {
        let workflow = MedicoWorkflow::new(Arc::new(FakeApi::with(sample())));
        let err = workflow.open_detail(99).await.unwrap_err();
        assert_eq!(err.banner_message(), "Consulta não encontrada");
        assert!(workflow.selected().await.is_none());

        workflow.dismiss_error().await;
        assert!(workflow.error().await.is_none());
    }

    #[tokio::test]
    async fn test_confirm_requires_open_detail() {
        let workflow = MedicoWorkflow::new(Arc::new(FakeApi::with(sample())));
        workflow.load_consultations().await.unwrap();
        let err = workflow.confirm_image(10, Diagnosis::Normal).await.unwrap_err();
        assert!(matches!(err, PtmdError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_legacy_confirmation_replaces_by_id() {
        let workflow = MedicoWorkflow::new(Arc::new(FakeApi::with(sample())));
        workflow.load_consultations().await.unwrap();
        workflow.open_detail(2).await.unwrap();

        workflow.confirm_consultation(2, Diagnosis::Earwax).await.unwrap();
        let state = workflow.snapshot().await;
        assert_eq!(state.board.get(2).unwrap().legacy.final_diagnosis.as_deref(), Some("earwax"));
        assert!(state.board.selected().unwrap().legacy.confirmed);
    }

    #[tokio::test]
    async fn test_duplicate_legacy_confirmation_is_rejected() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            consultations: Mutex::new(sample()),
            confirm_gate: Some(gate.clone()),
            ..Default::default()
        });
        let workflow = MedicoWorkflow::new(api);
        workflow.load_consultations().await.unwrap();

        let (first, second, _) = tokio::join!(
            workflow.confirm_consultation(2, Diagnosis::Earwax),
            workflow.confirm_consultation(2, Diagnosis::Aom),
            async {
                gate.notify_one();
            }
        );

        assert_eq!(first.unwrap().legacy.final_diagnosis.as_deref(), Some("earwax"));
        assert!(matches!(second, Err(PtmdError::Busy(_))));

        // 在途标记释放后可以再次提交
        gate.notify_one();
        assert!(workflow.confirm_consultation(2, Diagnosis::Normal).await.is_ok());
    }
}
