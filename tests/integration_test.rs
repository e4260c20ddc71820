/// End-to-end integration tests for the bugscope pipeline.
///
/// Tests the complete flow:
///   Corpus → Analyzer → Prefilter → Ranker → Fix → Report
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bugscope::analysis::MatchSource;
use bugscope::analysis::fix::FIX_UNAVAILABLE;
use bugscope::analysis::ranker::{FALLBACK_SCORE, RankerOptions};
use bugscope::corpus::{Decoder, SourceFile, chunk_sources, load_sources};
use bugscope::knowledge::{Glossary, KnowledgeContext};
use bugscope::lexical::LexicalRetriever;
use bugscope::llm::mock::MockModel;
use bugscope::llm::registry::{ModelEndpoint, ModelRegistry, SMOKE_TEST_PROMPT};
use bugscope::llm::{ModelError, Specialty};
use bugscope::pipeline::{BugLocator, Languages, PipelineOptions};
use bugscope::report::{AnalysisReport, save_json};
use tempfile::tempdir;

const REPORT: &str = "Crash in CSkillUse::Action when skill used on enemy death";

const ANALYSIS_REPLY: &str = r#"```json
{
  "keywords": ["CSkillUse", "Action"],
  "suspected_functions": ["CSkillUse::Action"],
  "bug_type": "crash",
  "severity": "high",
  "summary": "Using a skill on an enemy that is dying crashes the client."
}
```"#;

const SKILL_SOURCE: &str = "\
#include \"SkillUse.h\"

void CSkillUse::Action(CCharacter* target)
{
    int damage = m_pSkill->GetDamage();
    target->ApplyDamage(damage);
}
";

const MONSTER_SOURCE: &str = "\
#include \"Monster.h\"

void CMonster::Respawn()
{
    m_hp = m_maxHp;
}
";

/// Write a two-file corpus: `combat/SkillUse.cpp` sorts before `world/Monster.cpp`.
fn write_corpus(root: &Path) {
    fs::create_dir_all(root.join("combat")).unwrap();
    fs::create_dir_all(root.join("world")).unwrap();
    fs::write(root.join("combat/SkillUse.cpp"), SKILL_SOURCE).unwrap();
    fs::write(root.join("world/Monster.cpp"), MONSTER_SOURCE).unwrap();
    fs::write(root.join("README.txt"), "CSkillUse::Action docs").unwrap();
}

/// Scripted model: answers the probe, the analysis prompt, scoring batches
/// (score 9 for whichever chunk holds `CSkillUse::Action`) and the fix prompt.
fn scripted_model() -> MockModel {
    MockModel::new(|req| {
        let prompt = req.prompt;
        if prompt == SMOKE_TEST_PROMPT {
            Ok("def hello():\n    print('hello world')".to_string())
        } else if prompt.contains("BUG CAUSE") {
            Ok("1. FILE: SkillUse.cpp\n2. BUG LOCATION: line 6\n3. BUG CAUSE: target may be freed\n4. FIX SUGGESTION: check target\n5. ADDITIONAL CHECKS: none".to_string())
        } else if prompt.contains("CODE CHUNKS TO ANALYZE") {
            let items: Vec<String> = prompt
                .split("\nCHUNK ")
                .skip(1)
                .filter(|block| block.contains("CSkillUse::Action("))
                .filter_map(|block| block.split(':').next())
                .map(|index| {
                    format!(
                        r#"{{"chunk_index": {index}, "relevance_score": 9, "reasoning": "defines the crashing function", "suspected_lines": [6]}}"#
                    )
                })
                .collect();
            Ok(format!("[{}]", items.join(",")))
        } else if prompt.contains("Analyze the following bug report") {
            Ok(ANALYSIS_REPLY.to_string())
        } else {
            Err(ModelError::Request(format!("unexpected prompt: {prompt}")))
        }
    })
}

fn registry_with(model: impl bugscope::llm::ChatModel + 'static) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register_with(
            ModelEndpoint::new("coder", "http://localhost:1234", "qwen", Specialty::Code),
            Box::new(model),
        )
        .unwrap();
    registry
}

fn options(min_retained: usize) -> PipelineOptions {
    PipelineOptions {
        ranker: RankerOptions {
            min_retained,
            inter_call_delay: Duration::ZERO,
            ..RankerOptions::default()
        },
        ..PipelineOptions::default()
    }
}

/// Full pipeline: corpus on disk → analysis → ranking → fix → saved report
#[test]
fn test_full_pipeline() {
    // 1. Corpus on disk
    let temp_dir = tempdir().unwrap();
    let src = temp_dir.path().join("src");
    write_corpus(&src);
    let extensions = vec!["cpp".to_string(), "h".to_string()];
    let (files, stats) = load_sources(&src, &extensions, &Decoder::default()).unwrap();
    assert_eq!(stats.loaded, 2);

    // 2. Registry with a scripted model
    let model = Arc::new(scripted_model());
    let registry = registry_with(model.clone());

    // 3. One pass; a prefilter minimum of 1 lets the single match stand alone
    let outcome = BugLocator::new(&registry, options(1))
        .run(REPORT, &files)
        .unwrap();

    assert_eq!(outcome.chunk_count, 2);
    assert_eq!(outcome.analysis.keywords, vec!["CSkillUse", "Action"]);

    // prefilter kept only the SkillUse chunk
    let prompts = model.prompts();
    let batch: Vec<&String> = prompts
        .iter()
        .filter(|p| p.contains("CODE CHUNKS TO ANALYZE"))
        .collect();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].contains("SkillUse.cpp"));
    assert!(!batch[0].contains("Monster.cpp"));

    assert_eq!(outcome.matches.len(), 1);
    let top = &outcome.matches[0];
    assert!(top.chunk.file_path.ends_with("combat/SkillUse.cpp"));
    assert_eq!(top.relevance_score, 9);
    assert_eq!(top.suspected_lines, vec![6]);
    assert_eq!(top.source, MatchSource::Model);

    let fix = outcome.fix.as_ref().unwrap();
    assert!(fix.generated);
    assert!(fix.text.starts_with("1. FILE: SkillUse.cpp"));

    // 4. Persist and reload
    let out = temp_dir.path().join("bug_analysis_results.json");
    let report = AnalysisReport::new(REPORT, outcome);
    save_json(&report, &out).unwrap();
    let reloaded: AnalysisReport = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(reloaded.matches[0].relevance_score, 9);
    assert_eq!(reloaded.bug_report, REPORT);
}

/// With the default prefilter minimum the single keyword hit is not enough
/// to filter, both chunks are scored, and only the scored one is returned.
#[test]
fn test_default_prefilter_minimum() {
    let files = vec![
        SourceFile::new("combat/SkillUse.cpp", SKILL_SOURCE),
        SourceFile::new("world/Monster.cpp", MONSTER_SOURCE),
    ];
    let model = Arc::new(scripted_model());
    let registry = registry_with(model.clone());

    let outcome = BugLocator::new(&registry, options(3))
        .run(REPORT, &files)
        .unwrap();

    let batch = model
        .prompts()
        .into_iter()
        .find(|p| p.contains("CODE CHUNKS TO ANALYZE"))
        .unwrap();
    assert!(batch.contains("Monster.cpp"));

    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].chunk.file_path, "combat/SkillUse.cpp");
    assert_eq!(outcome.matches[0].relevance_score, 9);
}

/// Every model call after registration fails: the run still completes with
/// default analysis, fallback matches and the fixed fix message.
#[test]
fn test_pipeline_survives_failing_model() {
    let files: Vec<SourceFile> = (0..7)
        .map(|i| SourceFile::new(format!("src/file{i}.cpp"), format!("int value{i} = {i};")))
        .collect();
    let registry = registry_with(MockModel::failing_after_probe());

    let outcome = BugLocator::new(&registry, options(3))
        .run(REPORT, &files)
        .unwrap();

    assert_eq!(outcome.analysis.bug_type, "unknown");
    assert_eq!(outcome.matches.len(), 5);
    assert!(
        outcome
            .matches
            .iter()
            .all(|m| m.relevance_score == FALLBACK_SCORE && m.source == MatchSource::Fallback)
    );
    assert_eq!(outcome.matches[0].chunk.file_path, "src/file0.cpp");

    let fix = outcome.fix.unwrap();
    assert!(!fix.generated);
    assert_eq!(fix.text, FIX_UNAVAILABLE);
}

/// Translation endpoint wraps analysis and ranking output.
#[test]
fn test_pipeline_with_translation() {
    let files = vec![SourceFile::new("combat/SkillUse.cpp", SKILL_SOURCE)];
    let mut registry = registry_with(scripted_model());
    registry
        .register_with(
            ModelEndpoint::new("translator", "http://localhost:1235", "eeve", Specialty::Translation),
            Box::new(MockModel::new(|req| {
                if req.prompt.starts_with("Translate the following Korean") {
                    Ok(REPORT.to_string())
                } else {
                    Ok("[번역] 완료".to_string())
                }
            })),
        )
        .unwrap();

    let mut opts = options(1);
    opts.translation = Some(Languages {
        report: "Korean".to_string(),
        working: "English".to_string(),
    });
    let outcome = BugLocator::new(&registry, opts)
        .run("적이 죽을 때 스킬을 쓰면 CSkillUse::Action에서 크래시", &files)
        .unwrap();

    assert_eq!(outcome.analysis.keywords, vec!["CSkillUse", "Action"]);
    assert_eq!(outcome.analysis.summary, "[번역] 완료");
    assert_eq!(outcome.matches[0].reasoning, "[번역] 완료");
    assert_eq!(outcome.fix.unwrap().text, "[번역] 완료");
}

/// Knowledge context reaches the scoring prompt.
#[test]
fn test_knowledge_in_scoring_prompt() {
    let files = vec![SourceFile::new("combat/SkillUse.cpp", SKILL_SOURCE)];
    let model = Arc::new(scripted_model());
    let registry = registry_with(model.clone());
    let knowledge = KnowledgeContext {
        glossary: Glossary::parse("# classes\nCSkillUse,executes a skill against a target\n"),
        scripts: Vec::new(),
    };

    BugLocator::new(&registry, options(1))
        .with_knowledge(&knowledge)
        .run(REPORT, &files)
        .unwrap();

    let batch = model
        .prompts()
        .into_iter()
        .find(|p| p.contains("CODE CHUNKS TO ANALYZE"))
        .unwrap();
    assert!(batch.contains("CSkillUse: executes a skill against a target"));
}

/// Lexical baseline over the same corpus ranks the keyword chunk first.
#[test]
fn test_lexical_baseline() {
    let temp_dir = tempdir().unwrap();
    write_corpus(temp_dir.path());
    let extensions = vec!["cpp".to_string()];
    let (files, _) = load_sources(temp_dir.path(), &extensions, &Decoder::default()).unwrap();
    let chunks = chunk_sources(&files, 100);
    assert_eq!(chunks.len(), 2);

    let ranked = LexicalRetriever::default().rank(REPORT, &chunks);
    assert_eq!(ranked.len(), 2);
    assert!(chunks[ranked[0].chunk_index].file_path.ends_with("SkillUse.cpp"));
    assert!(ranked[0].similarity > ranked[1].similarity);
}
