//! Closed vocabularies of the approval workflow.
//!
//! Status, level, role and signature type are tied together by exhaustive
//! matches so that adding a step is a compile-time change.
use minicbor::{Decode, Encode};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileStatus {
    Draft,
    PendingWorkshopDirectorReview,
    PendingProductionTechManagerApproval,
    PendingInjectionManagerCountersign,
    Effective,
    Rejected,
    Invalidated,
}

impl FileStatus {
    pub const ALL: [FileStatus; 7] = [
        FileStatus::Draft,
        FileStatus::PendingWorkshopDirectorReview,
        FileStatus::PendingProductionTechManagerApproval,
        FileStatus::PendingInjectionManagerCountersign,
        FileStatus::Effective,
        FileStatus::Rejected,
        FileStatus::Invalidated,
    ];

    pub fn code(self) -> i8 {
        match self {
            FileStatus::Draft => 0,
            FileStatus::PendingWorkshopDirectorReview => 1,
            FileStatus::PendingProductionTechManagerApproval => 2,
            FileStatus::PendingInjectionManagerCountersign => 3,
            FileStatus::Effective => 5,
            FileStatus::Rejected => -1,
            FileStatus::Invalidated => -2,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn text(self) -> &'static str {
        match self {
            FileStatus::Draft => "草稿",
            FileStatus::PendingWorkshopDirectorReview => "待车间主任审核",
            FileStatus::PendingProductionTechManagerApproval => "待生产技术部经理批准",
            FileStatus::PendingInjectionManagerCountersign => "待注塑部经理会签",
            FileStatus::Effective => "已批准（生效中）",
            FileStatus::Rejected => "已驳回",
            FileStatus::Invalidated => "已作废",
        }
    }

    /// The approval level waiting on this status, if any.
    pub fn pending_level(self) -> Option<ApprovalLevel> {
        match self {
            FileStatus::PendingWorkshopDirectorReview => Some(ApprovalLevel::Review),
            FileStatus::PendingProductionTechManagerApproval => Some(ApprovalLevel::Approve),
            FileStatus::PendingInjectionManagerCountersign => Some(ApprovalLevel::Countersign),
            FileStatus::Draft
            | FileStatus::Effective
            | FileStatus::Rejected
            | FileStatus::Invalidated => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileStatus::Effective | FileStatus::Rejected | FileStatus::Invalidated
        )
    }
}

impl<C> minicbor::Encode<C> for FileStatus {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i8(self.code())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for FileStatus {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let code = d.i8()?;
        FileStatus::from_code(code)
            .ok_or_else(|| minicbor::decode::Error::message("unknown process file status code"))
    }
}

impl Serialize for FileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

/// The three ordered approval steps after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize)]
#[cbor(index_only)]
pub enum ApprovalLevel {
    #[n(1)]
    Review,
    #[n(2)]
    Approve,
    #[n(3)]
    Countersign,
}

impl ApprovalLevel {
    pub fn number(self) -> u8 {
        match self {
            ApprovalLevel::Review => 1,
            ApprovalLevel::Approve => 2,
            ApprovalLevel::Countersign => 3,
        }
    }

    pub fn required_role(self) -> RoleCode {
        match self {
            ApprovalLevel::Review => RoleCode::WorkshopDirector,
            ApprovalLevel::Approve => RoleCode::ProductionTechManager,
            ApprovalLevel::Countersign => RoleCode::InjectionManager,
        }
    }

    pub fn pending_status(self) -> FileStatus {
        match self {
            ApprovalLevel::Review => FileStatus::PendingWorkshopDirectorReview,
            ApprovalLevel::Approve => FileStatus::PendingProductionTechManagerApproval,
            ApprovalLevel::Countersign => FileStatus::PendingInjectionManagerCountersign,
        }
    }

    /// Status reached when this level passes.
    pub fn next_status(self) -> FileStatus {
        match self {
            ApprovalLevel::Review => FileStatus::PendingProductionTechManagerApproval,
            ApprovalLevel::Approve => FileStatus::PendingInjectionManagerCountersign,
            ApprovalLevel::Countersign => FileStatus::Effective,
        }
    }

    pub fn signature_type(self) -> SignatureType {
        match self {
            ApprovalLevel::Review => SignatureType::ApproveLevel1,
            ApprovalLevel::Approve => SignatureType::ApproveLevel2,
            ApprovalLevel::Countersign => SignatureType::ApproveLevel3,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ApprovalLevel::Review => "车间主任审核",
            ApprovalLevel::Approve => "生产技术部经理批准",
            ApprovalLevel::Countersign => "注塑部经理会签",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize)]
#[cbor(index_only)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCode {
    #[n(0)]
    InjectionLeader,
    #[n(1)]
    WorkshopDirector,
    #[n(2)]
    ProductionTechManager,
    #[n(3)]
    InjectionManager,
}

impl RoleCode {
    pub const ALL: [RoleCode; 4] = [
        RoleCode::InjectionLeader,
        RoleCode::WorkshopDirector,
        RoleCode::ProductionTechManager,
        RoleCode::InjectionManager,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RoleCode::InjectionLeader => "INJECTION_LEADER",
            RoleCode::WorkshopDirector => "WORKSHOP_DIRECTOR",
            RoleCode::ProductionTechManager => "PRODUCTION_TECH_MANAGER",
            RoleCode::InjectionManager => "INJECTION_MANAGER",
        }
    }

    /// The role name older accounts carry instead of a code.
    pub fn legacy_name(self) -> &'static str {
        match self {
            RoleCode::InjectionLeader => "注塑组长",
            RoleCode::WorkshopDirector => "车间主任",
            RoleCode::ProductionTechManager => "生产技术部经理",
            RoleCode::InjectionManager => "注塑部经理",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    pub fn from_legacy_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|r| r.legacy_name() == name)
    }

    /// The approval level this role acts on, if any.
    pub fn approval_level(self) -> Option<ApprovalLevel> {
        match self {
            RoleCode::WorkshopDirector => Some(ApprovalLevel::Review),
            RoleCode::ProductionTechManager => Some(ApprovalLevel::Approve),
            RoleCode::InjectionManager => Some(ApprovalLevel::Countersign),
            RoleCode::InjectionLeader => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize)]
#[cbor(index_only)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureType {
    #[n(0)]
    Submit,
    #[n(1)]
    ApproveLevel1,
    #[n(2)]
    ApproveLevel2,
    #[n(3)]
    ApproveLevel3,
}

impl SignatureType {
    pub const ALL: [SignatureType; 4] = [
        SignatureType::Submit,
        SignatureType::ApproveLevel1,
        SignatureType::ApproveLevel2,
        SignatureType::ApproveLevel3,
    ];

    pub fn code(self) -> &'static str {
        match self {
            SignatureType::Submit => "SUBMIT",
            SignatureType::ApproveLevel1 => "APPROVE_LEVEL1",
            SignatureType::ApproveLevel2 => "APPROVE_LEVEL2",
            SignatureType::ApproveLevel3 => "APPROVE_LEVEL3",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code.trim())
    }

    /// Sheet label whose cell below receives this signature.
    pub fn anchor_label(self) -> &'static str {
        match self {
            SignatureType::Submit => "编制人",
            SignatureType::ApproveLevel1 => "审核人",
            SignatureType::ApproveLevel2 => "批准人",
            SignatureType::ApproveLevel3 => "会签",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            SignatureType::Submit => "提交",
            SignatureType::ApproveLevel1 => "审核（车间主任）",
            SignatureType::ApproveLevel2 => "批准（生产技术部经理）",
            SignatureType::ApproveLevel3 => "会签（注塑部经理）",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize)]
#[cbor(index_only)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalResult {
    #[n(0)]
    Reject,
    #[n(1)]
    Pass,
}

impl ApprovalResult {
    pub fn code(self) -> u8 {
        match self {
            ApprovalResult::Reject => 0,
            ApprovalResult::Pass => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ApprovalResult::Reject),
            1 => Some(ApprovalResult::Pass),
            _ => None,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ApprovalResult::Reject => "驳回",
            ApprovalResult::Pass => "通过",
        }
    }
}
