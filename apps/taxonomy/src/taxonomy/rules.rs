use crate::models::SkillCategory;

/// A well-known parent skill and the skills that specialise it.
#[derive(Debug, Clone, Copy)]
pub struct KnownHierarchy {
    pub parent: &'static str,
    /// Category given to the parent when it has to be created.
    pub category: SkillCategory,
    pub children: &'static [&'static str],
}

const fn rule(
    parent: &'static str,
    category: SkillCategory,
    children: &'static [&'static str],
) -> KnownHierarchy {
    KnownHierarchy {
        parent,
        category,
        children,
    }
}

pub const KNOWN_HIERARCHIES: &[KnownHierarchy] = &[
    rule(
        "Python",
        SkillCategory::Language,
        &["Django", "Flask", "FastAPI", "Pandas", "NumPy", "SciPy", "PySpark"],
    ),
    rule(
        "JavaScript",
        SkillCategory::Language,
        &["React", "Vue.js", "Angular", "Node.js", "jQuery", "Svelte"],
    ),
    rule("React", SkillCategory::Framework, &["Next.js", "React Native", "Redux"]),
    rule("Node.js", SkillCategory::Framework, &["Express.js", "NestJS"]),
    rule("Java", SkillCategory::Language, &["Spring", "Hibernate", "Maven", "Gradle"]),
    rule("Spring", SkillCategory::Framework, &["Spring Boot", "Spring Cloud"]),
    rule("Kotlin", SkillCategory::Language, &["Ktor"]),
    rule("Ruby", SkillCategory::Language, &["Ruby on Rails"]),
    rule("PHP", SkillCategory::Language, &["Laravel", "Symfony"]),
    rule("C#", SkillCategory::Language, &[".NET", "ASP.NET", "Unity"]),
    rule("Rust", SkillCategory::Language, &["Tokio", "Actix", "Axum"]),
    rule("Go", SkillCategory::Language, &["Gin"]),
    rule(
        "Machine Learning",
        SkillCategory::Domain,
        &["Deep Learning", "Scikit-learn", "XGBoost", "Natural Language Processing", "Computer Vision"],
    ),
    rule("Deep Learning", SkillCategory::Domain, &["PyTorch", "TensorFlow", "Keras"]),
    rule(
        "Cloud Computing",
        SkillCategory::Platform,
        &["AWS", "Azure", "Google Cloud Platform", "GCP"],
    ),
    rule("AWS", SkillCategory::Platform, &["AWS Lambda", "Amazon S3", "Amazon EC2", "Amazon RDS"]),
    rule(
        "SQL",
        SkillCategory::Database,
        &["PostgreSQL", "MySQL", "SQLite", "Microsoft SQL Server", "Oracle Database"],
    ),
    rule(
        "NoSQL",
        SkillCategory::Database,
        &["MongoDB", "Redis", "Cassandra", "DynamoDB", "Elasticsearch"],
    ),
    rule(
        "DevOps",
        SkillCategory::Methodology,
        &["Docker", "Kubernetes", "Terraform", "Ansible", "Jenkins", "CI/CD"],
    ),
    rule("Kubernetes", SkillCategory::Tool, &["Helm"]),
    rule("Agile", SkillCategory::Methodology, &["Scrum", "Kanban"]),
    rule("Data Engineering", SkillCategory::Domain, &["Apache Spark", "Apache Airflow", "Apache Kafka", "dbt"]),
];
