pub mod document;
pub mod skill;

pub use document::Document;
pub use skill::{
    CanonicalSkill, ExtractedMention, HierarchyEdge, HierarchyStrategy, ProficiencyLevel,
    RequirementEdge, SkillCategory, SkillMention,
};
