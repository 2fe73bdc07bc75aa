use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use crate::domain::{Contact, ContactId, Lead, LeadFilter, LeadId, Pipeline, PipelineId, StatusId};

use super::{
    CrmGateway, CycleError, Disposition, FailureStage, GatewayError, LeadProcessor, Notifier,
    NotifyError, Trigger, WorkflowSettings,
};

const PIPELINE: PipelineId = PipelineId(1);
const SOURCE: StatusId = StatusId(10);
const TARGET: StatusId = StatusId(11);

fn settings() -> WorkflowSettings {
    WorkflowSettings {
        pipeline_id: PIPELINE,
        source_status_id: SOURCE,
        target_status_id: TARGET,
        search_concurrency: 2,
    }
}

fn lead(id: i64, phone: Option<&str>) -> Lead {
    Lead {
        id: LeadId(id),
        name: format!("Lead {id}"),
        pipeline_id: PIPELINE,
        status_id: SOURCE,
        contacts: vec![Contact { id: ContactId(id * 100), phone: phone.map(str::to_owned) }],
    }
}

fn pipeline(id: i64) -> Pipeline {
    Pipeline {
        id: PipelineId(id),
        name: format!("Pipeline {id}"),
        statuses: vec![StatusId(id * 10), StatusId(id * 10 + 1)],
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum CrmCall {
    ListStage,
    SearchPipeline(PipelineId),
    UpdateStatus(LeadId, StatusId),
    MergeLeads(LeadId, LeadId),
    MergeContacts(Vec<ContactId>, ContactId),
    ListPipelines,
}

/// Fake CRM: canned stage leads and pipelines, per-pipeline duplicate
/// hits, optional failure injection, full call recording.
#[derive(Default)]
struct FakeCrm {
    stage_leads: Vec<Lead>,
    pipelines: Vec<Pipeline>,
    duplicates: HashMap<PipelineId, Vec<Lead>>,
    failing_merges: Vec<LeadId>,
    fail_update_for: Vec<LeadId>,
    calls: StdMutex<Vec<CrmCall>>,
}

impl FakeCrm {
    fn calls(&self) -> Vec<CrmCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: CrmCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn merge_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, CrmCall::MergeLeads(..))).count()
    }

    fn update_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, CrmCall::UpdateStatus(..))).count()
    }
}

#[async_trait]
impl CrmGateway for FakeCrm {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, GatewayError> {
        match &filter.contact_phone {
            None => {
                self.record(CrmCall::ListStage);
                Ok(self.stage_leads.clone())
            }
            Some(_) => {
                let pipeline_id =
                    filter.statuses.first().map(|s| s.pipeline_id).unwrap_or(PipelineId(0));
                self.record(CrmCall::SearchPipeline(pipeline_id));
                Ok(self.duplicates.get(&pipeline_id).cloned().unwrap_or_default())
            }
        }
    }

    async fn update_lead_status(
        &self,
        lead_id: LeadId,
        _pipeline_id: PipelineId,
        status_id: StatusId,
    ) -> Result<(), GatewayError> {
        self.record(CrmCall::UpdateStatus(lead_id, status_id));
        if self.fail_update_for.contains(&lead_id) {
            return Err(GatewayError::Api { status: 400, message: "update rejected".to_owned() });
        }
        Ok(())
    }

    async fn merge_leads(&self, primary: LeadId, duplicate: LeadId) -> Result<Lead, GatewayError> {
        self.record(CrmCall::MergeLeads(primary, duplicate));
        if self.failing_merges.contains(&duplicate) {
            return Err(GatewayError::Api { status: 400, message: "merge rejected".to_owned() });
        }
        Ok(lead(primary.0, Some("merged")))
    }

    async fn merge_contacts(
        &self,
        sources: Vec<ContactId>,
        target: ContactId,
    ) -> Result<Contact, GatewayError> {
        self.record(CrmCall::MergeContacts(sources, target));
        Ok(Contact { id: target, phone: None })
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, GatewayError> {
        self.record(CrmCall::ListPipelines);
        Ok(self.pipelines.clone())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: StdMutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("messages lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Send("bot unreachable".to_owned()));
        }
        self.messages.lock().expect("messages lock").push(text.to_owned());
        Ok(())
    }
}

fn processor(crm: Arc<FakeCrm>, notifier: Arc<RecordingNotifier>) -> LeadProcessor {
    LeadProcessor::new(crm, notifier, settings())
}

#[tokio::test]
async fn lead_without_duplicates_is_advanced_exactly_once() {
    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("+7 (912) 555-01-02"))],
        pipelines: vec![pipeline(1), pipeline(2)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert_eq!(crm.merge_count(), 0);
    assert_eq!(crm.update_count(), 1);
    assert!(crm.calls().contains(&CrmCall::UpdateStatus(LeadId(1), TARGET)));
    assert_eq!(report.advanced_count(), 1);
    assert_eq!(notifier.messages().len(), 1);
    assert!(notifier.messages()[0].contains("Lead 1"));
}

#[tokio::test]
async fn duplicates_in_k_pipelines_produce_k_independent_merges() {
    let mut duplicates = HashMap::new();
    duplicates.insert(PipelineId(1), vec![lead(21, Some("5550102"))]);
    duplicates.insert(PipelineId(2), vec![lead(22, Some("5550102"))]);
    duplicates.insert(PipelineId(3), vec![lead(23, Some("5550102"))]);

    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("555-01-02"))],
        pipelines: vec![pipeline(1), pipeline(2), pipeline(3)],
        duplicates,
        // The middle attempt fails; the third must still run.
        failing_merges: vec![LeadId(22)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert_eq!(crm.merge_count(), 3);
    let attempts = match &report.outcomes[0].disposition {
        Disposition::Merged { attempts } => attempts.clone(),
        other => panic!("expected merged disposition, got {other:?}"),
    };
    assert_eq!(attempts.len(), 3);
    assert_eq!(
        attempts.iter().map(|a| a.merged).collect::<Vec<_>>(),
        vec![true, false, true],
        "failure of attempt two must not block attempt three"
    );
    // Merge attempts keep pipeline order.
    assert_eq!(
        attempts.iter().map(|a| a.duplicate_id).collect::<Vec<_>>(),
        vec![LeadId(21), LeadId(22), LeadId(23)]
    );
    // One notification per successful merge.
    assert_eq!(notifier.messages().len(), 2);
}

#[tokio::test]
async fn empty_fetch_is_a_batch_error_with_no_side_effects() {
    let crm = Arc::new(FakeCrm { pipelines: vec![pipeline(1)], ..FakeCrm::default() });
    let notifier = Arc::new(RecordingNotifier::default());

    let result = processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await;

    assert!(matches!(result, Err(CycleError::NoLeads)));
    assert_eq!(crm.calls(), vec![CrmCall::ListStage]);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn self_match_is_not_treated_as_a_duplicate() {
    let mut duplicates = HashMap::new();
    // The search in the lead's own pipeline returns the lead itself
    // first, followed by a genuine duplicate.
    duplicates
        .insert(PipelineId(1), vec![lead(1, Some("5550102")), lead(33, Some("5550102"))]);

    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("555 0102"))],
        pipelines: vec![pipeline(1)],
        duplicates,
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert!(crm.calls().contains(&CrmCall::MergeLeads(LeadId(1), LeadId(33))));
    assert!(!crm.calls().contains(&CrmCall::MergeLeads(LeadId(1), LeadId(1))));
}

#[tokio::test]
async fn lead_scoped_advance_failure_does_not_stop_the_batch() {
    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("5550102")), lead(2, Some("5550199"))],
        pipelines: vec![pipeline(1)],
        fail_update_for: vec![LeadId(1)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(
        report.outcomes[0].disposition,
        Disposition::Failed { stage: FailureStage::Advance, .. }
    ));
    assert!(matches!(report.outcomes[1].disposition, Disposition::Advanced { notified: true }));
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn leads_without_usable_phone_are_skipped_untouched() {
    let mut no_contact = lead(1, None);
    no_contact.contacts.clear();

    let crm = Arc::new(FakeCrm {
        stage_leads: vec![no_contact, lead(2, Some(" () - "))],
        pipelines: vec![pipeline(1)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert_eq!(report.skipped_count(), 2);
    assert_eq!(crm.merge_count(), 0);
    assert_eq!(crm.update_count(), 0);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_lead() {
    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("5550102"))],
        pipelines: vec![pipeline(1)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier { fail: true, ..RecordingNotifier::default() });

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    assert!(matches!(report.outcomes[0].disposition, Disposition::Advanced { notified: false }));
    assert_eq!(report.failed_count(), 0);
}

#[tokio::test]
async fn advancing_an_already_advanced_lead_is_a_no_op_for_the_workflow() {
    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("5550102"))],
        pipelines: vec![pipeline(1)],
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let processor = processor(Arc::clone(&crm), Arc::clone(&notifier));

    // The fake keeps returning the lead in the source stage, so the
    // second cycle re-advances it; both cycles must succeed.
    processor.run_cycle(Trigger::Timer).await.unwrap();
    processor.run_cycle(Trigger::Command).await.unwrap();

    assert_eq!(crm.update_count(), 2);
}

#[tokio::test]
async fn overlapping_trigger_is_dropped_while_a_cycle_runs() {
    struct BlockingCrm {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        inner: FakeCrm,
    }

    #[async_trait]
    impl CrmGateway for BlockingCrm {
        async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, GatewayError> {
            if filter.contact_phone.is_none() {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.list_leads(filter).await
        }

        async fn update_lead_status(
            &self,
            lead_id: LeadId,
            pipeline_id: PipelineId,
            status_id: StatusId,
        ) -> Result<(), GatewayError> {
            self.inner.update_lead_status(lead_id, pipeline_id, status_id).await
        }

        async fn merge_leads(
            &self,
            primary: LeadId,
            duplicate: LeadId,
        ) -> Result<Lead, GatewayError> {
            self.inner.merge_leads(primary, duplicate).await
        }

        async fn merge_contacts(
            &self,
            sources: Vec<ContactId>,
            target: ContactId,
        ) -> Result<Contact, GatewayError> {
            self.inner.merge_contacts(sources, target).await
        }

        async fn list_pipelines(&self) -> Result<Vec<Pipeline>, GatewayError> {
            self.inner.list_pipelines().await
        }
    }

    let crm = Arc::new(BlockingCrm {
        entered: tokio::sync::Notify::new(),
        release: tokio::sync::Notify::new(),
        inner: FakeCrm {
            stage_leads: vec![lead(1, Some("5550102"))],
            pipelines: vec![pipeline(1)],
            ..FakeCrm::default()
        },
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let processor = Arc::new(LeadProcessor::new(
        Arc::clone(&crm) as Arc<dyn CrmGateway>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        settings(),
    ));

    let first = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.run_cycle(Trigger::Timer).await })
    };
    // Wait until the first cycle holds the run guard inside fetch.
    crm.entered.notified().await;

    let second = processor.run_cycle(Trigger::Command).await;
    assert!(matches!(second, Err(CycleError::Overlapping)));

    crm.release.notify_one();
    let first = first.await.expect("first cycle task").expect("first cycle result");
    assert_eq!(first.advanced_count(), 1);
}

#[tokio::test]
async fn fetch_failure_aborts_the_cycle_as_batch_fatal() {
    struct FailingFetchCrm(FakeCrm);

    #[async_trait]
    impl CrmGateway for FailingFetchCrm {
        async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, GatewayError> {
            if filter.contact_phone.is_none() {
                return Err(GatewayError::Transport("connection reset".to_owned()));
            }
            self.0.list_leads(filter).await
        }

        async fn update_lead_status(
            &self,
            lead_id: LeadId,
            pipeline_id: PipelineId,
            status_id: StatusId,
        ) -> Result<(), GatewayError> {
            self.0.update_lead_status(lead_id, pipeline_id, status_id).await
        }

        async fn merge_leads(
            &self,
            primary: LeadId,
            duplicate: LeadId,
        ) -> Result<Lead, GatewayError> {
            self.0.merge_leads(primary, duplicate).await
        }

        async fn merge_contacts(
            &self,
            sources: Vec<ContactId>,
            target: ContactId,
        ) -> Result<Contact, GatewayError> {
            self.0.merge_contacts(sources, target).await
        }

        async fn list_pipelines(&self) -> Result<Vec<Pipeline>, GatewayError> {
            self.0.list_pipelines().await
        }
    }

    let crm = Arc::new(FailingFetchCrm(FakeCrm::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let processor =
        LeadProcessor::new(crm, Arc::clone(&notifier) as Arc<dyn Notifier>, settings());

    let result = processor.run_cycle(Trigger::Timer).await;

    assert!(matches!(result, Err(CycleError::Fetch(GatewayError::Transport(_)))));
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn duplicate_search_results_keep_pipeline_order() {
    let mut duplicates = HashMap::new();
    duplicates.insert(PipelineId(3), vec![lead(43, Some("5550102"))]);
    duplicates.insert(PipelineId(1), vec![lead(41, Some("5550102"))]);
    duplicates.insert(PipelineId(2), vec![lead(42, Some("5550102"))]);

    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(9, Some("5550102"))],
        pipelines: vec![pipeline(1), pipeline(2), pipeline(3)],
        duplicates,
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let report =
        processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    let attempts = match &report.outcomes[0].disposition {
        Disposition::Merged { attempts } => attempts.clone(),
        other => panic!("expected merged disposition, got {other:?}"),
    };
    assert_eq!(
        attempts.iter().map(|a| a.duplicate_id).collect::<Vec<_>>(),
        vec![LeadId(41), LeadId(42), LeadId(43)],
        "matches must follow pipeline listing order even with concurrent searches"
    );
}

#[tokio::test]
async fn merge_steps_run_in_lead_contact_advance_order() {
    let mut duplicates = HashMap::new();
    duplicates.insert(PipelineId(1), vec![lead(33, Some("5550102"))]);

    let crm = Arc::new(FakeCrm {
        stage_leads: vec![lead(1, Some("5550102"))],
        pipelines: vec![pipeline(1)],
        duplicates,
        ..FakeCrm::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());

    processor(Arc::clone(&crm), Arc::clone(&notifier)).run_cycle(Trigger::Timer).await.unwrap();

    let calls = crm.calls();
    let merge_leads = calls
        .iter()
        .position(|c| matches!(c, CrmCall::MergeLeads(..)))
        .expect("merge_leads call");
    let merge_contacts = calls
        .iter()
        .position(|c| matches!(c, CrmCall::MergeContacts(..)))
        .expect("merge_contacts call");
    let advance = calls
        .iter()
        .position(|c| matches!(c, CrmCall::UpdateStatus(..)))
        .expect("update_status call");

    assert!(merge_leads < merge_contacts && merge_contacts < advance);
    // The primary lead's contacts are folded into the duplicate's
    // primary contact.
    assert!(calls.contains(&CrmCall::MergeContacts(vec![ContactId(100)], ContactId(3300))));
}
